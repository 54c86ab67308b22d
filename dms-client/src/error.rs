use crate::models::DocumentId;
use reqwest::StatusCode;
use thiserror::Error;

/// Transport-level failure reported by the API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid endpoint: {0}")]
    InvalidUrl(String),

    #[error("Session expired")]
    SessionExpired,
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Conflict(String),

    #[error("A sign-in attempt is already in progress")]
    LoginInProgress,

    #[error("Signed out before the sign-in completed")]
    Superseded,

    #[error("Authentication failed: {0}")]
    Remote(String),

    #[error("Authentication service unreachable: {0}")]
    Transport(String),

    #[error("Could not persist session: {0}")]
    Persist(#[from] CacheError),
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Status { status, .. } if status == StatusCode::UNAUTHORIZED => {
                AuthError::InvalidCredentials
            }
            ApiError::Status { status, message }
                if status == StatusCode::BAD_REQUEST || status == StatusCode::CONFLICT =>
            {
                AuthError::Conflict(message)
            }
            ApiError::Status { message, .. } => AuthError::Remote(message),
            ApiError::SessionExpired => AuthError::InvalidCredentials,
            other => AuthError::Transport(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Sign in to view documents")]
    NotSignedIn,

    #[error("Administrator access required")]
    Forbidden,

    #[error("Page numbers start at 1 (got {0})")]
    InvalidPage(u32),

    #[error("No documents are loaded for {requested}")]
    ScopeMismatch { requested: String },

    #[error("Expected page {expected}, got {requested}")]
    PageOutOfOrder { expected: u32, requested: u32 },

    #[error("All pages are already loaded")]
    NoMorePages,

    #[error("Nothing is loaded in this view yet")]
    NothingLoaded,

    #[error("Result discarded: the view changed while loading")]
    Superseded,

    #[error("Session expired")]
    SessionExpired,

    #[error("Failed to load documents: {message}")]
    Remote { status: StatusCode, message: String },

    #[error("Failed to load documents: {0}")]
    Transport(String),
}

impl From<ApiError> for FetchError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::SessionExpired => FetchError::SessionExpired,
            ApiError::Status { status, .. } if status == StatusCode::FORBIDDEN => {
                FetchError::Forbidden
            }
            ApiError::Status { status, message } => FetchError::Remote { status, message },
            other => FetchError::Transport(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{filename} is not an accepted document type (allowed: {allowed})")]
    InvalidType { filename: String, allowed: String },

    #[error("File is {size} bytes; the limit is {max} bytes")]
    Oversize { size: u64, max: u64 },

    #[error("Upload rejected: {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("An upload is already in progress")]
    InFlight,

    #[error("Sign in to upload documents")]
    NotSignedIn,

    #[error("Session expired")]
    SessionExpired,

    #[error("Upload failed: {0}")]
    Transport(String),

    #[error("Could not read file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ApiError> for UploadError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::SessionExpired => UploadError::SessionExpired,
            ApiError::Status { status, message } => UploadError::Rejected { status, message },
            other => UploadError::Transport(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("Document {0} was not found")]
    NotFound(DocumentId),

    #[error("Delete failed: {message}")]
    Remote { status: StatusCode, message: String },

    #[error("Document {0} is already being deleted")]
    InFlight(DocumentId),

    #[error("Sign in to delete documents")]
    NotSignedIn,

    #[error("Session expired")]
    SessionExpired,

    #[error("Delete failed: {0}")]
    Transport(String),
}

impl DeleteError {
    pub(crate) fn from_api(id: DocumentId, err: ApiError) -> Self {
        match err {
            ApiError::SessionExpired => DeleteError::SessionExpired,
            ApiError::Status { status, .. } if status == StatusCode::NOT_FOUND => {
                DeleteError::NotFound(id)
            }
            ApiError::Status { status, message } => DeleteError::Remote { status, message },
            other => DeleteError::Transport(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{0} was not found")]
    NotFound(String),

    #[error("Document {0} is not loaded in any view")]
    UnknownDocument(DocumentId),

    #[error("{0} is already downloading")]
    InFlight(String),

    #[error("Sign in to download documents")]
    NotSignedIn,

    #[error("Session expired")]
    SessionExpired,

    #[error("Download failed: {0}")]
    Transport(String),

    #[error("Could not save file: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub(crate) fn from_api(filename: &str, err: ApiError) -> Self {
        match err {
            ApiError::SessionExpired => DownloadError::SessionExpired,
            ApiError::Status { status, .. } if status == StatusCode::NOT_FOUND => {
                DownloadError::NotFound(filename.to_string())
            }
            other => DownloadError::Transport(other.to_string()),
        }
    }
}
