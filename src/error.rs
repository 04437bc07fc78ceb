//! Error type shared by the library and the binary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillError {
    #[error("{0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("settings file is not valid TOML: {0}")]
    TomlRead(#[from] toml::de::Error),

    #[error("could not serialize settings: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("prompt failed: {0}")]
    Prompt(#[from] inquire::InquireError),

    #[error("no bill matches '{0}'")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, BillError>;
