//! Error types shared across presswork crates.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error for operations that span several presswork subsystems,
/// such as loading config and article files from the command line.
#[derive(Debug, Error, Diagnostic)]
pub enum PressworkError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot read {}", path.display())]
    #[diagnostic(code(presswork::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {}", path.display())]
    #[diagnostic(code(presswork::write))]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PressworkError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {}", path.display())]
    #[diagnostic(code(config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid KDL in config file")]
    #[diagnostic(code(config::kdl))]
    Kdl(#[from] kdl::KdlError),

    #[error("invalid JSON in config file")]
    #[diagnostic(code(config::json))]
    Json(#[source] serde_json::Error),

    #[error("unsupported config file extension for {}", path.display())]
    #[diagnostic(
        code(config::extension),
        help("use a .kdl or .json file")
    )]
    UnsupportedFormat { path: PathBuf },

    #[error("invalid value for {key}: {value}")]
    #[diagnostic(code(config::value))]
    InvalidValue { key: String, value: String },

    #[error("invalid public base URL {url}: {message}")]
    #[diagnostic(code(config::url))]
    UrlParse { url: String, message: String },
}
