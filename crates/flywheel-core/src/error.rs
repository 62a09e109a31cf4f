//! The engine's error taxonomy (§7). Every surfaced error carries a stable
//! `kind()` and a human message; only store corruption aborts the process.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PathRejected,
    NotFound,
    ParseFailure,
    StoreError,
    VcsError,
    RegexUnsafe,
    ConcurrencyLoss,
    IndexNotReady,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::PathRejected => "PathRejected",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ParseFailure => "ParseFailure",
            ErrorKind::StoreError => "StoreError",
            ErrorKind::VcsError => "VcsError",
            ErrorKind::RegexUnsafe => "RegexUnsafe",
            ErrorKind::ConcurrencyLoss => "ConcurrencyLoss",
            ErrorKind::IndexNotReady => "IndexNotReady",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    /// For `NotFound` on a missing section: the note's actual section names,
    /// so the caller can suggest alternatives.
    pub suggestions: Vec<String>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn path_rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PathRejected, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailure, message)
    }

    pub fn store_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreError, message)
    }

    pub fn vcs_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::VcsError, message)
    }

    pub fn regex_unsafe(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RegexUnsafe, message)
    }

    pub fn index_not_ready() -> Self {
        Self::new(ErrorKind::IndexNotReady, "entity index has not been built yet")
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::store_error(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::new(ErrorKind::StoreError, e.to_string())
    }
}

impl From<obsidian_fs::PathError> for EngineError {
    fn from(e: obsidian_fs::PathError) -> Self {
        EngineError::path_rejected(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Exit codes for the orchestrator's CLI surface (§6).
pub fn exit_code(err: &EngineError) -> i32 {
    match err.kind {
        ErrorKind::PathRejected | ErrorKind::NotFound | ErrorKind::ParseFailure | ErrorKind::RegexUnsafe => 2,
        ErrorKind::VcsError => 3,
        ErrorKind::StoreError => 5,
        ErrorKind::ConcurrencyLoss | ErrorKind::IndexNotReady => 4,
    }
}
