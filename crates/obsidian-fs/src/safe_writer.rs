//! Path-safety validation and atomic file writes.
//!
//! `validate_path_secure` is the single gate every vault mutation passes
//! through: traversal, sensitive-file, and symlink-escape checks all live
//! here. `SafeWriter` performs the actual write — temp file, fsync, atomic
//! rename — the same shape as the teacher's `FileStorage::atomic_write`.

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

const SENSITIVE_PATTERNS: &[&str] = &[
    ".env*",
    "*.pem",
    "*.key",
    "id_rsa*",
    "id_ed25519*",
    "*.p12",
    "*.pfx",
    "*.jks",
    "credentials.*",
    "secrets.*",
    ".htpasswd",
    "etc/shadow",
    "etc/passwd",
    ".git/*",
];

#[derive(Debug, Clone, PartialEq)]
pub enum PathError {
    Traversal { path: String },
    Sensitive { path: String, pattern: &'static str },
    SymlinkEscape { path: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Traversal { path } => write!(f, "path escapes vault via '..': {path}"),
            PathError::Sensitive { path, pattern } => {
                write!(f, "path '{path}' matches sensitive pattern '{pattern}'")
            }
            PathError::SymlinkEscape { path } => {
                write!(f, "path '{path}' resolves outside the vault via a symlink")
            }
        }
    }
}

impl std::error::Error for PathError {}

/// Validate that `relpath`, resolved against `vault`, is safe to read or
/// write: no `..` traversal, no match against a sensitive-file pattern, and
/// no symlink that would resolve outside the vault.
///
/// Returns the cleaned, vault-relative path (slash-separated, no leading
/// `/`) on success.
pub fn validate_path_secure(vault: &Path, relpath: &str) -> Result<String, PathError> {
    let clean = relpath.strip_prefix('/').unwrap_or(relpath);

    if clean.split('/').any(|seg| seg == "..") {
        return Err(PathError::Traversal {
            path: relpath.to_string(),
        });
    }

    for pattern in SENSITIVE_PATTERNS {
        if path_matches_pattern(clean, pattern) {
            return Err(PathError::Sensitive {
                path: relpath.to_string(),
                pattern,
            });
        }
    }

    let candidate = vault.join(clean);
    if let Ok(vault_real) = std::fs::canonicalize(vault) {
        // Resolve as far as possible: the file itself may not exist yet, so
        // walk up to the first ancestor that does and canonicalize that,
        // then re-append the remaining (not-yet-existing) components.
        let mut existing = candidate.as_path();
        let mut remainder: Vec<std::ffi::OsString> = Vec::new();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) if parent != existing => {
                    if let Some(name) = existing.file_name() {
                        remainder.push(name.to_os_string());
                    }
                    existing = parent;
                }
                _ => break,
            }
        }

        if let Ok(mut real) = std::fs::canonicalize(existing) {
            for comp in remainder.into_iter().rev() {
                real.push(comp);
            }
            if !real.starts_with(&vault_real) {
                return Err(PathError::SymlinkEscape {
                    path: relpath.to_string(),
                });
            }
        }
    }

    Ok(clean.to_string())
}

/// Minimal glob matcher supporting only `*` (the sensitive-pattern list
/// never needs `?` or character classes). Matching is done per path
/// segment for patterns containing `/`, and against the file name alone
/// otherwise.
fn path_matches_pattern(path: &str, pattern: &str) -> bool {
    if pattern.contains('/') {
        return glob_match(pattern, path);
    }
    let file_name = path.rsplit('/').next().unwrap_or(path);
    glob_match(pattern, file_name)
        || path.split('/').any(|seg| glob_match(pattern, seg))
}

fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(pat: &[u8], text: &[u8]) -> bool {
        match (pat.first(), text.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                let rest = &pat[1..];
                if inner(rest, text) {
                    return true;
                }
                !text.is_empty() && inner(pat, &text[1..])
            }
            (Some(p), Some(t)) if p == t => inner(&pat[1..], &text[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

/// Content hash for optimistic-locking on write (see SPEC_FULL §C).
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

/// Atomic, fsync'd file writer used by every note mutation path.
pub struct SafeWriter;

#[derive(Debug, Clone, PartialEq)]
pub enum WriteError {
    Io(String),
    HashMismatch { expected: String, actual: String },
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::Io(msg) => write!(f, "io error: {msg}"),
            WriteError::HashMismatch { expected, actual } => write!(
                f,
                "content changed since last read: expected hash {expected}, found {actual}"
            ),
        }
    }
}

impl std::error::Error for WriteError {}

impl SafeWriter {
    /// Write `content` to `path`, optionally checking that the file's
    /// current content hash matches `expected_hash` first (optimistic
    /// locking). Uses a temp-file-then-rename sequence so readers never
    /// observe a partially written file.
    pub fn write(path: &Path, content: &str, expected_hash: Option<&str>) -> Result<String, WriteError> {
        if let Some(expected) = expected_hash {
            match std::fs::read_to_string(path) {
                Ok(current) => {
                    let actual = content_hash(&current);
                    if actual != expected {
                        return Err(WriteError::HashMismatch {
                            expected: expected.to_string(),
                            actual,
                        });
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(WriteError::HashMismatch {
                        expected: expected.to_string(),
                        actual: "(file does not exist)".to_string(),
                    });
                }
                Err(e) => return Err(WriteError::Io(e.to_string())),
            }
        }

        let temp_path = Self::temp_sibling(path);
        let result = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&temp_path)?;
            use std::io::Write;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&temp_path, path)?;
            Ok(())
        })();

        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(WriteError::Io(e.to_string()));
        }

        Ok(content_hash(content))
    }

    fn temp_sibling(path: &Path) -> PathBuf {
        let suffix: u32 = rand_suffix();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "note".to_string());
        path.with_file_name(format!(".{file_name}.{suffix:08x}.tmp"))
    }
}

fn rand_suffix() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    nanos ^ (std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_traversal() {
        let vault = TempDir::new().unwrap();
        let err = validate_path_secure(vault.path(), "../outside.md").unwrap_err();
        assert!(matches!(err, PathError::Traversal { .. }));
    }

    #[test]
    fn rejects_nested_traversal() {
        let vault = TempDir::new().unwrap();
        let err = validate_path_secure(vault.path(), "knowledge/../../escape.md").unwrap_err();
        assert!(matches!(err, PathError::Traversal { .. }));
    }

    #[test]
    fn rejects_sensitive_patterns() {
        let vault = TempDir::new().unwrap();
        assert!(matches!(
            validate_path_secure(vault.path(), ".env.local").unwrap_err(),
            PathError::Sensitive { .. }
        ));
        assert!(matches!(
            validate_path_secure(vault.path(), "keys/id_rsa").unwrap_err(),
            PathError::Sensitive { .. }
        ));
        assert!(matches!(
            validate_path_secure(vault.path(), ".git/config").unwrap_err(),
            PathError::Sensitive { .. }
        ));
    }

    #[test]
    fn accepts_normal_notes() {
        let vault = TempDir::new().unwrap();
        assert!(validate_path_secure(vault.path(), "knowledge/My Note.md").is_ok());
    }

    #[test]
    fn rejects_symlink_escape() {
        let vault = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.md"), "secret").unwrap();

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(outside.path(), vault.path().join("escape")).unwrap();
            let err = validate_path_secure(vault.path(), "escape/secret.md").unwrap_err();
            assert!(matches!(err, PathError::SymlinkEscape { .. }));
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        let hash = SafeWriter::write(&path, "hello", None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        assert_eq!(hash, content_hash("hello"));
    }

    #[test]
    fn hash_mismatch_blocks_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        SafeWriter::write(&path, "v1", None).unwrap();
        let err = SafeWriter::write(&path, "v2", Some("deadbeefdead")).unwrap_err();
        assert!(matches!(err, WriteError::HashMismatch { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v1");
    }

    #[test]
    fn matching_hash_allows_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        let hash1 = SafeWriter::write(&path, "v1", None).unwrap();
        SafeWriter::write(&path, "v2", Some(&hash1)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v2");
    }

    #[test]
    fn glob_matches_star_suffix_and_prefix() {
        assert!(glob_match(".env*", ".env.local"));
        assert!(glob_match("*.pem", "server.pem"));
        assert!(!glob_match("*.pem", "server.pem.bak"));
    }
}
