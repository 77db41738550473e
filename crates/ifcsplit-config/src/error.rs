//! Configuration errors.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Filesystem step that failed while handling a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Read,
    Write,
    CreateDir,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileAction::Read => "read config file",
            FileAction::Write => "write config file",
            FileAction::CreateDir => "create config directory",
        })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to {action} '{path}': {source}")]
    File {
        action: FileAction,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to render config as TOML: {0}")]
    Render(#[from] toml::ser::Error),

    /// No home directory, so there is no global config location
    #[error("could not determine home directory for the global config")]
    NoHomeDir,

    /// A file passed with `--config` is absent
    #[error("config file '{0}' does not exist")]
    MissingFile(PathBuf),

    /// A setting outside its allowed range, keyed by its TOML path
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("invalid discipline table: {0}")]
    Disciplines(String),
}

impl ConfigError {
    pub fn file(action: FileAction, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn invalid_value(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            message: message.into(),
        }
    }
}
