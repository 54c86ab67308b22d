//! Transient, user-facing notifications derived from operation errors.

use crate::error::{AuthError, DeleteError, DownloadError, FetchError, UploadError};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(title: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
        }
    }

    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(title, description, Severity::Success)
    }

    fn error(title: &str, description: impl fmt::Display) -> Self {
        Self::new(title, description.to_string(), Severity::Error)
    }

    fn warning(title: &str, description: impl fmt::Display) -> Self {
        Self::new(title, description.to_string(), Severity::Warning)
    }

    fn session_expired() -> Self {
        Self::warning("Session expired", "Please sign in again.")
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.severity {
            Severity::Info => "i",
            Severity::Success => "+",
            Severity::Warning => "!",
            Severity::Error => "x",
        };
        write!(f, "[{}] {}: {}", marker, self.title, self.description)
    }
}

/// Errors that can be shown to the user. `None` means nothing is shown.
pub trait Notify {
    fn notification(&self) -> Option<Notification>;
}

impl Notify for AuthError {
    fn notification(&self) -> Option<Notification> {
        Some(match self {
            AuthError::Invalid(_) => Notification::warning("Check your details", self),
            AuthError::LoginInProgress => Notification::new(
                "Signing in",
                "A sign-in attempt is already in progress.",
                Severity::Info,
            ),
            AuthError::Conflict(_) => Notification::error("Sign up failed", self),
            AuthError::Superseded => Notification::new("Signing in", self.to_string(), Severity::Info),
            _ => Notification::error("Sign in failed", self),
        })
    }
}

impl Notify for FetchError {
    fn notification(&self) -> Option<Notification> {
        match self {
            FetchError::Superseded => None,
            FetchError::SessionExpired => Some(Notification::session_expired()),
            FetchError::NoMorePages => Some(Notification::new(
                "Documents",
                "All documents are loaded.",
                Severity::Info,
            )),
            FetchError::Forbidden | FetchError::NotSignedIn => {
                Some(Notification::warning("Access denied", self))
            }
            _ => Some(Notification::error("Failed to load documents", self)),
        }
    }
}

impl Notify for UploadError {
    fn notification(&self) -> Option<Notification> {
        Some(match self {
            UploadError::SessionExpired => Notification::session_expired(),
            UploadError::InvalidType { .. } => Notification::warning("Invalid file type", self),
            UploadError::Oversize { .. } => Notification::warning("File too large", self),
            UploadError::InFlight => Notification::new("Upload", self.to_string(), Severity::Info),
            _ => Notification::error("Upload failed", self),
        })
    }
}

impl Notify for DeleteError {
    fn notification(&self) -> Option<Notification> {
        Some(match self {
            DeleteError::SessionExpired => Notification::session_expired(),
            DeleteError::InFlight(_) => Notification::new("Delete", self.to_string(), Severity::Info),
            _ => Notification::error("Delete failed", self),
        })
    }
}

impl Notify for DownloadError {
    fn notification(&self) -> Option<Notification> {
        Some(match self {
            DownloadError::SessionExpired => Notification::session_expired(),
            DownloadError::InFlight(_) => {
                Notification::new("Download", self.to_string(), Severity::Info)
            }
            _ => Notification::error("Download failed", self),
        })
    }
}

/// Shows the error's notification on stderr and hands the error on.
pub fn report<E>(err: E) -> anyhow::Error
where
    E: Notify + std::error::Error + Send + Sync + 'static,
{
    if let Some(notification) = err.notification() {
        eprintln!("{}", notification);
    }
    anyhow::Error::new(err)
}
