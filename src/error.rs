use crate::library::TitleId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Failed to encode session: {0}")]
    SessionEncode(#[from] serde_json::Error),

    #[error("Config directory not found")]
    NoConfigDir,

    #[error("Data directory not found")]
    NoDataDir,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("No async runtime available for the transfer scheduler")]
    NoRuntime,

    #[error("Title {0} is already downloading")]
    AlreadyDownloading(TitleId),

    #[error("Title {0} is already downloaded")]
    AlreadyDownloaded(TitleId),

    #[error("An upload is already in progress")]
    UploadInProgress,

    #[error("No upload is in progress")]
    NotUploading,

    #[error("Upload has not completed yet")]
    UploadNotComplete,

    #[error("Upload already complete, acknowledge it instead")]
    UploadComplete,

    #[error("Draft is missing {0}")]
    IncompleteDraft(&'static str),

    #[error("Category already exists: {0}")]
    DuplicateCategory(String),

    #[error("Title not found: {0}")]
    TitleNotFound(TitleId),

    #[error("Message has no content")]
    EmptyMessage,

    #[error("No SD card available for downloads")]
    NoSdCard,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Action requires an admin account")]
    Forbidden,
}

impl Error {
    /// Rejected commands leave all state untouched; everything else is a
    /// local failure (IO, config).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::AlreadyDownloading(_)
                | Error::AlreadyDownloaded(_)
                | Error::UploadInProgress
                | Error::NotUploading
                | Error::UploadNotComplete
                | Error::UploadComplete
                | Error::IncompleteDraft(_)
                | Error::DuplicateCategory(_)
                | Error::TitleNotFound(_)
                | Error::EmptyMessage
                | Error::NoSdCard
                | Error::NotSignedIn
                | Error::Forbidden
        )
    }
}

/// Failure to release or persist a transient media handle. Logged, never
/// escalated.
#[derive(Debug, thiserror::Error)]
#[error("Media operation on {locator} failed: {reason}")]
pub struct MediaError {
    pub locator: String,
    pub reason: String,
}

pub type Result<T> = std::result::Result<T, Error>;
