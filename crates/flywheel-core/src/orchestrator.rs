//! Drives a single vault-file mutation end to end (§9): read, validate,
//! transform, write, record, best-effort commit.

use std::path::PathBuf;

use regex::Regex;

use obsidian_fs::{read_note, write_note, FrontMatterValue, OrderedMap, ParsedNote, SafeWriter};

use crate::config::EngineConfig;
use crate::entity_index::EntityIndexData;
use crate::error::{EngineError, EngineResult};
use crate::linker::Linker;
use crate::scorer::{Scorer, ScorerOptions};
use crate::section_editor::{not_found_with_section_suggestions, ContentFormat, InsertPosition, SectionEditor};
use crate::store::{MutationHintRow, StateStore};
use crate::suggestions::SuggestionRecorder;
use crate::vcs::VcsOps;

#[derive(Debug, Clone)]
pub enum Operation {
    AddToSection {
        section: String,
        payload: String,
        format: ContentFormat,
        position: InsertPosition,
    },
    RemoveFromSection {
        section: String,
        pattern: String,
    },
    ReplaceInSection {
        section: String,
        pattern: String,
        replacement: String,
    },
    UpdateFrontMatter {
        set: Vec<(String, FrontMatterValue)>,
        remove: Vec<String>,
    },
    CreateNote {
        frontmatter: OrderedMap,
        content: String,
    },
    DeleteNote,
    ToggleTask {
        section: String,
        task_text: String,
    },
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::AddToSection { .. } => "AddToSection",
            Operation::RemoveFromSection { .. } => "RemoveFromSection",
            Operation::ReplaceInSection { .. } => "ReplaceInSection",
            Operation::UpdateFrontMatter { .. } => "UpdateFrontMatter",
            Operation::CreateNote { .. } => "CreateNote",
            Operation::DeleteNote => "DeleteNote",
            Operation::ToggleTask { .. } => "ToggleTask",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorContext {
    pub vault: PathBuf,
    pub note_path: String,
    pub commit: bool,
    pub commit_prefix: String,
    pub action_description: String,
}

#[derive(Debug, Clone, Default)]
pub struct OperationOutcome {
    pub message: String,
    pub warnings: Vec<String>,
    pub git_error: Option<String>,
    pub commit_hash: Option<String>,
    pub suggestion_suffix: String,
    before_hash: String,
    after_hash: String,
}

pub struct Orchestrator;

impl Orchestrator {
    /// Runs one operation to completion. Returns only `NotFound`,
    /// `ParseFailure`, `PathRejected`, or `StoreError` per §7's propagation
    /// policy — `VcsError` never escapes, it is folded into `git_error`.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        ctx: &OrchestratorContext,
        operation: Operation,
        store: &mut StateStore,
        index: &EntityIndexData,
        config: &EngineConfig,
        now_ms: i64,
    ) -> EngineResult<OperationOutcome> {
        let relpath = obsidian_fs::validate_path_secure(&ctx.vault, &ctx.note_path)?;
        let abs_path = ctx.vault.join(&relpath);
        let operation_name = operation.name();

        let outcome = match operation {
            Operation::DeleteNote => Self::delete_note(&abs_path)?,
            Operation::CreateNote { frontmatter, content } => Self::create_note(&abs_path, frontmatter, content)?,
            Operation::UpdateFrontMatter { set, remove } => Self::update_front_matter(&abs_path, set, remove)?,
            Operation::AddToSection { section, payload, format, position } => {
                Self::add_to_section(&abs_path, &relpath, &section, &payload, format, position, store, index, config, now_ms)?
            }
            Operation::RemoveFromSection { section, pattern } => Self::remove_from_section(&abs_path, &section, &pattern)?,
            Operation::ReplaceInSection { section, pattern, replacement } => {
                Self::replace_in_section(&abs_path, &section, &pattern, &replacement)?
            }
            Operation::ToggleTask { section, task_text } => Self::toggle_task(&abs_path, &section, &task_text)?,
        };

        store.push_mutation_hint(&MutationHintRow {
            timestamp_ms: now_ms,
            path: relpath.clone(),
            operation: operation_name.to_string(),
            before_hash: outcome.before_hash.clone(),
            after_hash: outcome.after_hash.clone(),
        })?;

        let mut outcome = outcome;
        if ctx.commit {
            let commit_outcome = VcsOps::commit(&ctx.vault, &relpath, &ctx.commit_prefix).await;
            if commit_outcome.success {
                outcome.commit_hash = commit_outcome.hash.clone();
                VcsOps::record_tracked_commit_if_own(store, &commit_outcome, &ctx.commit_prefix, &relpath, now_ms)?;
            } else {
                outcome.git_error = commit_outcome.error;
            }
        }

        Ok(outcome)
    }

    fn delete_note(abs_path: &std::path::Path) -> EngineResult<OperationOutcome> {
        let original = std::fs::read_to_string(abs_path).unwrap_or_default();
        let before_hash = obsidian_fs::content_hash(&original);
        std::fs::remove_file(abs_path)?;
        Ok(OperationOutcome {
            message: "note deleted".to_string(),
            before_hash,
            after_hash: obsidian_fs::content_hash(""),
            ..Default::default()
        })
    }

    fn create_note(abs_path: &std::path::Path, frontmatter: OrderedMap, content: String) -> EngineResult<OperationOutcome> {
        if let Some(parent) = abs_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let note = ParsedNote {
            frontmatter,
            content,
            line_ending: obsidian_fs::LineEnding::Lf,
            bom: false,
        };
        let rendered = write_note(&note);
        let after_hash = SafeWriter::write(abs_path, &rendered, None).map_err(|e| EngineError::store_error(e.to_string()))?;
        Ok(OperationOutcome {
            message: "note created".to_string(),
            before_hash: obsidian_fs::content_hash(""),
            after_hash,
            ..Default::default()
        })
    }

    fn update_front_matter(abs_path: &std::path::Path, set: Vec<(String, FrontMatterValue)>, remove: Vec<String>) -> EngineResult<OperationOutcome> {
        let mut note = read_note(abs_path).map_err(|e| EngineError::parse_failure(e.to_string()))?;
        let before_hash = obsidian_fs::content_hash(&write_note(&note));
        for (key, value) in set {
            note.frontmatter.insert(key, value);
        }
        if !remove.is_empty() {
            let kept: OrderedMap = note
                .frontmatter
                .iter()
                .filter(|(k, _)| !remove.contains(k))
                .cloned()
                .collect();
            note.frontmatter = kept;
        }
        let rendered = write_note(&note);
        let after_hash = SafeWriter::write(abs_path, &rendered, None).map_err(|e| EngineError::store_error(e.to_string()))?;
        Ok(OperationOutcome {
            message: "front matter updated".to_string(),
            before_hash,
            after_hash,
            ..Default::default()
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn add_to_section(
        abs_path: &std::path::Path,
        relpath: &str,
        section_name: &str,
        payload: &str,
        format: ContentFormat,
        position: InsertPosition,
        store: &StateStore,
        index: &EntityIndexData,
        config: &EngineConfig,
        now_ms: i64,
    ) -> EngineResult<OperationOutcome> {
        let note = read_note(abs_path).map_err(|e| EngineError::parse_failure(e.to_string()))?;
        let before_hash = obsidian_fs::content_hash(&write_note(&note));
        let section = SectionEditor::find_section(&note.content, section_name)
            .ok_or_else(|| not_found_with_section_suggestions(&note.content, section_name))?;

        let formatted = SectionEditor::format_content(payload, format, None);
        let with_insert = SectionEditor::insert_in_section(&note.content, &section, &formatted, position, true);

        let options = ScorerOptions {
            strictness: config.strictness,
            note_path: Some(relpath.to_string()),
            max_suggestions: config.max_suggestions,
            ..Default::default()
        };

        let score_result = Scorer::score(&formatted, &options, index, store, now_ms);
        let link_result = Linker::link(&with_insert, &score_result.suggestions, index);

        for entity_name in &link_result.linked_entities {
            let _ = SuggestionRecorder::record_application(store, relpath, entity_name, now_ms);
        }

        let mut updated = note.clone();
        updated.content = link_result.content;
        let rendered = write_note(&updated);
        let after_hash = SafeWriter::write(abs_path, &rendered, None).map_err(|e| EngineError::store_error(e.to_string()))?;

        Ok(OperationOutcome {
            message: format!("added to section '{section_name}'"),
            suggestion_suffix: score_result.suffix,
            before_hash,
            after_hash,
            ..Default::default()
        })
    }

    fn remove_from_section(abs_path: &std::path::Path, section_name: &str, pattern: &str) -> EngineResult<OperationOutcome> {
        vet_pattern(pattern)?;
        let note = read_note(abs_path).map_err(|e| EngineError::parse_failure(e.to_string()))?;
        let before_hash = obsidian_fs::content_hash(&write_note(&note));
        let section = SectionEditor::find_section(&note.content, section_name)
            .ok_or_else(|| not_found_with_section_suggestions(&note.content, section_name))?;

        let re = Regex::new(pattern).map_err(|e| EngineError::regex_unsafe(e.to_string()))?;
        let lines: Vec<&str> = note.content.lines().collect();
        let retained: Vec<&str> = lines
            .iter()
            .enumerate()
            .filter(|(i, line)| !(*i >= section.content_start_line && *i <= section.end_line && re.is_match(line)))
            .map(|(_, line)| *line)
            .collect();

        let mut updated = note.clone();
        updated.content = retained.join("\n");
        if note.content.ends_with('\n') {
            updated.content.push('\n');
        }
        let rendered = write_note(&updated);
        let after_hash = SafeWriter::write(abs_path, &rendered, None).map_err(|e| EngineError::store_error(e.to_string()))?;

        Ok(OperationOutcome {
            message: format!("removed matching lines from section '{section_name}'"),
            before_hash,
            after_hash,
            ..Default::default()
        })
    }

    fn replace_in_section(abs_path: &std::path::Path, section_name: &str, pattern: &str, replacement: &str) -> EngineResult<OperationOutcome> {
        vet_pattern(pattern)?;
        let note = read_note(abs_path).map_err(|e| EngineError::parse_failure(e.to_string()))?;
        let before_hash = obsidian_fs::content_hash(&write_note(&note));
        let section = SectionEditor::find_section(&note.content, section_name)
            .ok_or_else(|| not_found_with_section_suggestions(&note.content, section_name))?;

        let re = Regex::new(pattern).map_err(|e| EngineError::regex_unsafe(e.to_string()))?;
        let lines: Vec<String> = note
            .content
            .lines()
            .enumerate()
            .map(|(i, line)| {
                if i >= section.content_start_line && i <= section.end_line {
                    re.replace_all(line, replacement).into_owned()
                } else {
                    line.to_string()
                }
            })
            .collect();

        let mut updated = note.clone();
        updated.content = lines.join("\n");
        if note.content.ends_with('\n') {
            updated.content.push('\n');
        }
        let rendered = write_note(&updated);
        let after_hash = SafeWriter::write(abs_path, &rendered, None).map_err(|e| EngineError::store_error(e.to_string()))?;

        Ok(OperationOutcome {
            message: format!("replaced matches in section '{section_name}'"),
            before_hash,
            after_hash,
            ..Default::default()
        })
    }

    fn toggle_task(abs_path: &std::path::Path, section_name: &str, task_text: &str) -> EngineResult<OperationOutcome> {
        let note = read_note(abs_path).map_err(|e| EngineError::parse_failure(e.to_string()))?;
        let before_hash = obsidian_fs::content_hash(&write_note(&note));
        let section = SectionEditor::find_section(&note.content, section_name)
            .ok_or_else(|| not_found_with_section_suggestions(&note.content, section_name))?;

        let task_re = Regex::new(r"^(\s*[-*+]\s\[)([ xX])(\]\s.*)$").expect("static task pattern is valid");
        let mut toggled = false;
        let lines: Vec<String> = note
            .content
            .lines()
            .enumerate()
            .map(|(i, line)| {
                if toggled || i < section.content_start_line || i > section.end_line || !line.contains(task_text) {
                    return line.to_string();
                }
                if let Some(caps) = task_re.captures(line) {
                    toggled = true;
                    let flipped = if caps[2].trim().is_empty() { "x" } else { " " };
                    format!("{}{}{}", &caps[1], flipped, &caps[3])
                } else {
                    line.to_string()
                }
            })
            .collect();

        if !toggled {
            return Err(EngineError::not_found(format!("no task line containing '{task_text}' in section '{section_name}'")));
        }

        let mut updated = note.clone();
        updated.content = lines.join("\n");
        if note.content.ends_with('\n') {
            updated.content.push('\n');
        }
        let rendered = write_note(&updated);
        let after_hash = SafeWriter::write(abs_path, &rendered, None).map_err(|e| EngineError::store_error(e.to_string()))?;

        Ok(OperationOutcome {
            message: "task toggled".to_string(),
            before_hash,
            after_hash,
            ..Default::default()
        })
    }
}

/// Rejects user-supplied patterns that could blow up a regex engine: too
/// long, or showing the classic nested/adjacent-quantifier ReDoS shapes.
fn vet_pattern(pattern: &str) -> EngineResult<()> {
    if pattern.len() > 500 {
        return Err(EngineError::regex_unsafe("pattern exceeds 500 characters"));
    }
    const UNSAFE_SHAPES: &[&str] = &["(.*)*", "(.+)+", "++", "**"];
    for shape in UNSAFE_SHAPES {
        if pattern.contains(shape) {
            return Err(EngineError::regex_unsafe(format!("pattern contains unsafe shape '{shape}'")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_index::EntityIndex;
    use tempfile::TempDir;

    fn vault_with_note(content: &str) -> (TempDir, String) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("note.md"), content).unwrap();
        (dir, "note.md".to_string())
    }

    fn empty_index() -> EntityIndexData {
        let store = StateStore::open_in_memory().unwrap();
        let mut index = EntityIndex::new();
        index.rebuild(&store).unwrap();
        (*index.snapshot()).clone()
    }

    #[tokio::test]
    async fn add_to_section_appends_and_persists() {
        let (dir, note_path) = vault_with_note("## Log\n- a\n");
        let ctx = OrchestratorContext {
            vault: dir.path().to_path_buf(),
            note_path,
            commit: false,
            commit_prefix: "[Flywheel]".to_string(),
            action_description: "append log entry".to_string(),
        };
        let mut store = StateStore::open_in_memory().unwrap();
        let index = empty_index();
        let config = EngineConfig::new(dir.path().to_path_buf());

        let operation = Operation::AddToSection {
            section: "Log".to_string(),
            payload: "did the thing".to_string(),
            format: ContentFormat::Bullet,
            position: InsertPosition::Append,
        };
        let outcome = Orchestrator::run(&ctx, operation, &mut store, &index, &config, 1_000).await.unwrap();
        assert_eq!(outcome.message, "added to section 'Log'");

        let written = std::fs::read_to_string(dir.path().join("note.md")).unwrap();
        assert!(written.contains("- did the thing"));
        assert!(written.contains("- a"));
    }

    #[tokio::test]
    async fn missing_section_reports_suggestions() {
        let (dir, note_path) = vault_with_note("## Priorities\ncontent\n");
        let ctx = OrchestratorContext {
            vault: dir.path().to_path_buf(),
            note_path,
            commit: false,
            commit_prefix: "[Flywheel]".to_string(),
            action_description: "append".to_string(),
        };
        let mut store = StateStore::open_in_memory().unwrap();
        let index = empty_index();
        let config = EngineConfig::new(dir.path().to_path_buf());

        let operation = Operation::AddToSection {
            section: "Nope".to_string(),
            payload: "x".to_string(),
            format: ContentFormat::Plain,
            position: InsertPosition::Append,
        };
        let err = Orchestrator::run(&ctx, operation, &mut store, &index, &config, 1_000).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
        assert_eq!(err.suggestions, vec!["Priorities".to_string()]);
    }

    #[tokio::test]
    async fn replace_in_section_rejects_unsafe_pattern() {
        let (dir, note_path) = vault_with_note("## Log\n- a\n");
        let ctx = OrchestratorContext {
            vault: dir.path().to_path_buf(),
            note_path,
            commit: false,
            commit_prefix: "[Flywheel]".to_string(),
            action_description: "replace".to_string(),
        };
        let mut store = StateStore::open_in_memory().unwrap();
        let index = empty_index();
        let config = EngineConfig::new(dir.path().to_path_buf());

        let operation = Operation::ReplaceInSection {
            section: "Log".to_string(),
            pattern: "(.*)*".to_string(),
            replacement: "x".to_string(),
        };
        let err = Orchestrator::run(&ctx, operation, &mut store, &index, &config, 1_000).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RegexUnsafe);
    }

    #[tokio::test]
    async fn toggle_task_flips_checkbox() {
        let (dir, note_path) = vault_with_note("## Tasks\n- [ ] buy milk\n");
        let ctx = OrchestratorContext {
            vault: dir.path().to_path_buf(),
            note_path,
            commit: false,
            commit_prefix: "[Flywheel]".to_string(),
            action_description: "toggle".to_string(),
        };
        let mut store = StateStore::open_in_memory().unwrap();
        let index = empty_index();
        let config = EngineConfig::new(dir.path().to_path_buf());

        let operation = Operation::ToggleTask {
            section: "Tasks".to_string(),
            task_text: "buy milk".to_string(),
        };
        Orchestrator::run(&ctx, operation, &mut store, &index, &config, 1_000).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("note.md")).unwrap();
        assert!(written.contains("- [x] buy milk"));
    }

    #[tokio::test]
    async fn lock_contended_commit_leaves_file_mutation_intact() {
        use std::process::Command;
        let dir = TempDir::new().unwrap();
        Command::new("git").args(["init"]).current_dir(dir.path()).output().unwrap();
        Command::new("git")
            .args(["config", "user.email", "t@localhost"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "T"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        std::fs::write(dir.path().join("note.md"), "## Log\n- a\n").unwrap();
        std::fs::write(dir.path().join(".git").join("index.lock"), "").unwrap();

        let ctx = OrchestratorContext {
            vault: dir.path().to_path_buf(),
            note_path: "note.md".to_string(),
            commit: true,
            commit_prefix: "[Flywheel]".to_string(),
            action_description: "append".to_string(),
        };
        let mut store = StateStore::open_in_memory().unwrap();
        let index = empty_index();
        let config = EngineConfig::new(dir.path().to_path_buf());

        let operation = Operation::AddToSection {
            section: "Log".to_string(),
            payload: "locked write".to_string(),
            format: ContentFormat::Bullet,
            position: InsertPosition::Append,
        };
        let outcome = Orchestrator::run(&ctx, operation, &mut store, &index, &config, 1_000).await.unwrap();

        assert!(outcome.git_error.is_some());
        let error = outcome.git_error.unwrap().to_lowercase();
        assert!(error.contains("lock") || error.contains("index"));

        let written = std::fs::read_to_string(dir.path().join("note.md")).unwrap();
        assert!(written.contains("- locked write"));
    }
}
