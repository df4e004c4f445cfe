//! User configuration for the request layer: output theme and the owner to
//! act for when none is given on the command line.

use crate::error::AppError;
use crate::storage::json_store::{default_root, validate_owner_id};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "ROUTINE_CONFIG_PATH";
const RESET: &str = "\x1b[0m";

/// Colouring of plain (non-JSON) output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Plain,
    Noir,
    Solarized,
}

impl Theme {
    /// Ignores case and punctuation; `dark` is an alias of noir and anything
    /// unrecognised renders plain.
    pub fn from_name(raw: &str) -> Self {
        let folded: String = raw
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|ch| ch.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "noir" | "dark" | "darkmode" => Self::Noir,
            "solarized" => Self::Solarized,
            _ => Self::Plain,
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            Self::Plain => Palette::default(),
            Self::Noir => Palette {
                accent: "\x1b[38;5;208m",
                muted: "\x1b[38;5;250m",
            },
            Self::Solarized => Palette {
                accent: "\x1b[38;5;108m",
                muted: "\x1b[38;5;250m",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Palette {
    accent: &'static str,
    muted: &'static str,
}

impl Palette {
    pub fn accentize(&self, text: &str) -> String {
        paint(self.accent, text)
    }

    pub fn mutedize(&self, text: &str) -> String {
        paint(self.muted, text)
    }
}

fn paint(code: &str, text: &str) -> String {
    if code.is_empty() {
        text.to_string()
    } else {
        format!("{code}{text}{RESET}")
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub default_owner: Option<String>,
}

impl Config {
    pub fn theme(&self) -> Theme {
        self.theme.as_deref().map(Theme::from_name).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

/// Values given with `--config-override`; `None` keeps the file's value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub theme: Option<String>,
    pub default_owner: Option<String>,
}

pub fn config_path() -> Result<PathBuf, AppError> {
    match std::env::var(CONFIG_ENV_VAR) {
        Ok(path) if !path.trim().is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(default_root()?.join(CONFIG_FILE_NAME)),
    }
}

/// Never fails: a missing file yields defaults, an unreadable one yields
/// defaults plus the error so the caller can warn about it.
pub fn load_config_with_fallback() -> ConfigLoad {
    into_load(config_path().and_then(|path| read_config(&path)))
}

fn into_load(result: Result<Config, AppError>) -> ConfigLoad {
    match result {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn read_config(path: &Path) -> Result<Config, AppError> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::storage(format!("{}: {}", path.display(), err)))?;
    serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Config {
    Config {
        theme: overrides.theme.clone().or_else(|| base.theme.clone()),
        default_owner: overrides
            .default_owner
            .as_deref()
            .map(|owner| owner.trim().to_string())
            .or_else(|| base.default_owner.clone()),
    }
}

/// The owner a command acts for: the explicit value if present, else the
/// configured default.
pub fn resolve_owner(explicit: Option<&str>, config: &Config) -> Result<String, AppError> {
    let candidate = explicit
        .filter(|value| !value.trim().is_empty())
        .or(config.default_owner.as_deref())
        .ok_or_else(|| {
            AppError::invalid_input("owner is required (--owner, ROUTINE_OWNER or default_owner)")
        })?;
    Ok(validate_owner_id(candidate)?.to_string())
}
