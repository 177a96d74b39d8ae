use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("No AWS credentials configured")]
    NoCredentials,

    #[error("AWS error ({code}): {message}")]
    Client { code: String, message: String },

    #[error("The bucket name '{bucket}' is already in use globally. Try another name.")]
    BucketNameTaken { bucket: String },

    #[error("'{bucket}' is not a valid bucket name: {reason}")]
    InvalidBucketName { bucket: String, reason: String },

    #[error("The region '{region}' is not valid for this request")]
    InvalidRegion { region: String },

    #[error("I/O error for {path}: {message}")]
    LocalIo { path: String, message: String },

    #[error("Network error: {message}")]
    Transport { message: String },

    #[error("Another operation ({running}) is still running")]
    Busy { running: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("Item {position}/{total} ('{key}') failed: {source}")]
    BatchItem {
        position: usize,
        total: usize,
        key: String,
        #[source]
        source: Box<ManagerError>,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NoCredentials,
    Client,
    BucketNameTaken,
    InvalidBucketName,
    InvalidRegion,
    LocalIo,
    Transport,
    Busy,
    InvalidInput,
    Unexpected,
}

impl ManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::NoCredentials => ErrorKind::NoCredentials,
            ManagerError::Client { .. } => ErrorKind::Client,
            ManagerError::BucketNameTaken { .. } => ErrorKind::BucketNameTaken,
            ManagerError::InvalidBucketName { .. } => ErrorKind::InvalidBucketName,
            ManagerError::InvalidRegion { .. } => ErrorKind::InvalidRegion,
            ManagerError::LocalIo { .. } => ErrorKind::LocalIo,
            ManagerError::Transport { .. } => ErrorKind::Transport,
            ManagerError::Busy { .. } => ErrorKind::Busy,
            ManagerError::InvalidInput(_) => ErrorKind::InvalidInput,
            ManagerError::BatchItem { source, .. } => source.kind(),
            ManagerError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    pub fn client(code: impl Into<String>, message: impl Into<String>) -> Self {
        ManagerError::Client {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn local_io(path: impl AsRef<std::path::Path>, err: impl std::fmt::Display) -> Self {
        ManagerError::LocalIo {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Provider error code, looking through batch wrappers.
    pub fn code(&self) -> Option<&str> {
        match self {
            ManagerError::Client { code, .. } => Some(code.as_str()),
            ManagerError::BatchItem { source, .. } => source.code(),
            _ => None,
        }
    }
}

pub type Result<T, E = ManagerError> = std::result::Result<T, E>;
