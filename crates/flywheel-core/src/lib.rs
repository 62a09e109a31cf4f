//! Local-first wikilink suggestion and auto-linking engine for a Markdown
//! vault (§1-§9). No network calls, no LLM calls: every suggestion is
//! produced by the tokenizer/scorer/linker pipeline against state held in
//! a per-vault SQLite file.

pub mod config;
pub mod cooccurrence;
pub mod edge_weights;
pub mod entity;
pub mod entity_index;
pub mod error;
pub mod graph;
pub mod linker;
pub mod orchestrator;
pub mod recency;
pub mod scorer;
pub mod section_editor;
pub mod store;
pub mod suggestions;
pub mod tokenizer;
pub mod vcs;

pub use config::{EngineConfig, Strictness};
pub use entity::{Category, Entity};
pub use entity_index::{EntityIndex, EntityIndexData};
pub use error::{exit_code, EngineError, EngineResult, ErrorKind};
pub use linker::{LinkResult, Linker};
pub use orchestrator::{Operation, OperationOutcome, Orchestrator, OrchestratorContext};
pub use scorer::{Candidate, Layer, ScoreResult, Scorer, ScorerOptions};
pub use section_editor::{ContentFormat, InsertPosition, Section, SectionEditor};
pub use store::StateStore;
pub use suggestions::{DashboardExtended, FeedbackApis, Observability, SnapshotDiff, SuggestionRecorder};
pub use vcs::{CommitInfo, CommitOutcome, UndoOutcome, VcsOps};
