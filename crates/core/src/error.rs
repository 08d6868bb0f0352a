use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object does not exist: {0}")]
    ObjectDoesNotExist(String),

    #[error("tag '{0}' has a definition and cannot be attached to media")]
    BoundTagHasDefinition(String),

    #[error("file already exists: {}", .0.display())]
    FileAlreadyExists(PathBuf),

    #[error("file does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("missing permissions for: {}", .0.display())]
    MissingPermissions(PathBuf),

    #[error("file operation failed on {}: {message}", .path.display())]
    UnknownFileError { path: PathBuf, message: String },

    #[error("unsupported schema version {found} (expected {expected})")]
    InvalidSchemaVersion { found: i64, expected: i64 },

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("invalid label: {0}")]
    InvalidLabel(String),

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("duplicate label: {0}")]
    DuplicateLabel(String),

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("tag definition expands to more than {limit} nodes")]
    DefinitionTooComplex { limit: usize },
}

impl Error {
    /// Classify a filesystem error against the path it happened on.
    pub(crate) fn from_file_op(err: std::io::Error, path: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::MissingFile(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Error::MissingPermissions(path.to_path_buf()),
            _ => Error::UnknownFileError {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
