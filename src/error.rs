use thiserror::Error;

use crate::upload::UploadError;
use crate::util::CommandError;

#[derive(Error, Debug)]
pub enum RelmanError {
    #[error("Task error: {0}")]
    Task(String),

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Required input archives are not on disk; nothing was modified.
    #[error("missing archives: {}", .0.join(", "))]
    MissingArchives(Vec<String>),
}

impl From<toml::de::Error> for RelmanError {
    fn from(err: toml::de::Error) -> Self {
        RelmanError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelmanError>;
