//! Engine configuration (§6), modeled on the teacher's `Config::from_env`.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Conservative,
    Balanced,
    Aggressive,
}

impl Strictness {
    pub fn base_threshold(self) -> f64 {
        match self {
            Strictness::Conservative => 15.0,
            Strictness::Balanced => 8.0,
            Strictness::Aggressive => 5.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "conservative" => Some(Strictness::Conservative),
            "balanced" => Some(Strictness::Balanced),
            "aggressive" => Some(Strictness::Aggressive),
            _ => None,
        }
    }
}

impl Default for Strictness {
    fn default() -> Self {
        Strictness::Conservative
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub vault_path: PathBuf,
    pub strictness: Strictness,
    pub commit_prefix: String,
    pub max_suggestions: usize,
    pub excluded_folders: Vec<String>,
    pub staleness_ms: i64,
}

impl EngineConfig {
    pub fn new(vault_path: PathBuf) -> Self {
        Self {
            vault_path,
            strictness: Strictness::default(),
            commit_prefix: "[Flywheel]".to_string(),
            max_suggestions: 3,
            excluded_folders: default_excluded_folders(),
            staleness_ms: 3_600_000,
        }
    }

    /// Load configuration from environment variables, expanding `~` the way
    /// the teacher's `Config::from_env` does.
    ///
    /// Required: `FLYWHEEL_VAULT_PATH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var("FLYWHEEL_VAULT_PATH").map_err(|_| ConfigError::MissingVaultPath)?;
        let vault_path = expand_tilde(&raw);
        let mut config = Self::new(vault_path);

        if let Ok(strictness) = std::env::var("FLYWHEEL_STRICTNESS") {
            if let Some(parsed) = Strictness::parse(&strictness) {
                config.strictness = parsed;
            }
        }
        if let Ok(prefix) = std::env::var("FLYWHEEL_COMMIT_PREFIX") {
            config.commit_prefix = prefix;
        }
        if let Ok(max) = std::env::var("FLYWHEEL_MAX_SUGGESTIONS") {
            if let Ok(n) = max.parse() {
                config.max_suggestions = n;
            }
        }

        Ok(config)
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.vault_path.join(".state.db")
    }
}

fn default_excluded_folders() -> Vec<String> {
    [
        "node_modules",
        ".git",
        "daily-notes",
        "journal",
        "templates",
        "inbox",
        "weekly",
        "monthly",
        "quarterly",
        "periodic",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FLYWHEEL_VAULT_PATH environment variable not set")]
    MissingVaultPath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_match_spec() {
        assert_eq!(Strictness::Conservative.base_threshold(), 15.0);
        assert_eq!(Strictness::Balanced.base_threshold(), 8.0);
        assert_eq!(Strictness::Aggressive.base_threshold(), 5.0);
    }

    #[test]
    fn default_excludes_periodic_folders() {
        let config = EngineConfig::new(PathBuf::from("/tmp/vault"));
        assert!(config.excluded_folders.contains(&"journal".to_string()));
        assert!(config.excluded_folders.contains(&"daily-notes".to_string()));
    }
}
