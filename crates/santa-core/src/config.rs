// Configuration loading and parsing (config/santa.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::draw::DEFAULT_MAX_ATTEMPTS;

/// Environment variable overriding `database.path`.
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";

const CONFIG_FILE: &str = "santa.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// santa.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub join: JoinConfig,
    pub draw: DrawConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "secret_santa.db".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Inputs that abort the join conversation, matched case-insensitively.
    pub cancel_keywords: Vec<String>,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            cancel_keywords: vec!["cancel".into(), "/cancel".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    /// Shuffles tried before the rotation fallback.
    pub max_attempts: u32,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Parse config text. Missing sections and keys take their defaults.
pub fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load and validate `config/santa.toml` relative to `base_dir`, then apply
/// the `DATABASE_PATH` override from `env_database_path`.
///
/// This is the lower-level loading primitive that neither copies defaults
/// nor reads the process environment. Prefer `load_config()`.
pub fn load_config_from(
    base_dir: &Path,
    env_database_path: Option<String>,
) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let mut config = parse_config(&text, &path)?;

    if let Some(db_path) = env_database_path.filter(|p| !p.trim().is_empty()) {
        config.database.path = db_path;
    }

    validate(&config)?;
    Ok(config)
}

/// Copy `defaults/santa.toml` to `config/santa.toml` when the latter is
/// missing. Returns the copied path, if any.
pub fn ensure_config_files(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let default_path = base_dir.join("defaults").join(CONFIG_FILE);
    let config_dir = base_dir.join("config");
    let target = config_dir.join(CONFIG_FILE);

    if target.exists() {
        return Ok(None);
    }
    if !default_path.exists() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "neither {} nor {} found; run from the project root",
                default_path.display(),
                target.display()
            ),
        });
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;
    std::fs::copy(&default_path, &target).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {}: {e}", default_path.display()),
    })?;

    Ok(Some(target))
}

/// Convenience wrapper: loads config relative to the current working
/// directory, copying defaults first and honouring `DATABASE_PATH`.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd, std::env::var(DATABASE_PATH_ENV).ok())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.database.path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    if config.draw.max_attempts == 0 {
        return Err(ConfigError::ValidationError {
            field: "draw.max_attempts".into(),
            message: "must be greater than 0".into(),
        });
    }

    if let Some(blank) = config
        .join
        .cancel_keywords
        .iter()
        .find(|k| k.trim().is_empty())
    {
        return Err(ConfigError::ValidationError {
            field: "join.cancel_keywords".into(),
            message: format!("keywords must not be blank, got {blank:?}"),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
