use std::path::PathBuf;
use thiserror::Error;

/// Conditions callers need to tell apart. Everything else travels as a plain
/// `anyhow::Error` with context attached.
#[derive(Debug, Error)]
pub enum CoastsegError {
    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("The {0} is empty")]
    EmptyFrame(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),

    #[error("Missing column '{0}'")]
    MissingColumn(String),
}

/// Find a `CoastsegError` anywhere in an error chain
pub fn find_coastseg_error(err: &anyhow::Error) -> Option<&CoastsegError> {
    err.chain().find_map(|cause| cause.downcast_ref::<CoastsegError>())
}
