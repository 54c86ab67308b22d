//! Client-side checks run before any upload reaches the network.

use crate::config::UploadSettings;
use crate::error::UploadError;
use crate::models::DocumentKind;
use std::path::Path;

/// File content plus the declared metadata of an upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    /// Declared MIME type. When absent the kind is taken from the extension.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(filename, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// The kind this file declares: its MIME type if set, else its extension.
    pub fn declared_kind(&self) -> Option<DocumentKind> {
        match &self.content_type {
            Some(mime) => DocumentKind::from_mime(mime),
            None => DocumentKind::from_filename(&self.filename),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_bytes: u64,
    allowed: Vec<DocumentKind>,
}

impl UploadPolicy {
    pub fn new(max_bytes: u64, allowed: Vec<DocumentKind>) -> Self {
        Self { max_bytes, allowed }
    }

    pub fn from_settings(settings: &UploadSettings) -> Self {
        let allowed = settings
            .allowed_types
            .iter()
            .filter_map(|ext| {
                let kind = DocumentKind::from_extension(ext);
                if kind.is_none() {
                    tracing::warn!(extension = %ext, "Ignoring unsupported upload type in settings");
                }
                kind
            })
            .collect();
        Self::new(settings.max_bytes, allowed)
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn allowed(&self) -> &[DocumentKind] {
        &self.allowed
    }

    /// Type first, then size.
    pub fn check(&self, file: &UploadFile) -> Result<DocumentKind, UploadError> {
        let kind = file
            .declared_kind()
            .filter(|kind| self.allowed.contains(kind))
            .ok_or_else(|| UploadError::InvalidType {
                filename: file.filename.clone(),
                allowed: self
                    .allowed
                    .iter()
                    .map(|k| k.extension())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        if file.size() > self.max_bytes {
            return Err(UploadError::Oversize {
                size: file.size(),
                max: self.max_bytes,
            });
        }

        Ok(kind)
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from_settings(&UploadSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_kinds_by_extension() {
        let policy = UploadPolicy::default();
        let file = UploadFile::new("contract.docx", vec![0; 16]);
        assert_eq!(policy.check(&file).unwrap(), DocumentKind::Docx);
    }

    #[test]
    fn declared_mime_wins_over_extension() {
        let policy = UploadPolicy::default();
        let file = UploadFile::new("scan.pdf", vec![0; 16]).with_content_type("image/png");
        assert!(matches!(
            policy.check(&file),
            Err(UploadError::InvalidType { .. })
        ));
    }

    #[test]
    fn rejects_oversize_files() {
        let policy = UploadPolicy::new(8, DocumentKind::ALL.to_vec());
        let file = UploadFile::new("notes.txt", vec![0; 9]);
        assert!(matches!(
            policy.check(&file),
            Err(UploadError::Oversize { size: 9, max: 8 })
        ));
    }

    #[test]
    fn exact_limit_is_allowed() {
        let policy = UploadPolicy::new(8, DocumentKind::ALL.to_vec());
        assert!(policy.check(&UploadFile::new("notes.txt", vec![0; 8])).is_ok());
    }

    #[test]
    fn settings_restrict_kinds() {
        let policy = UploadPolicy::from_settings(&UploadSettings {
            max_bytes: 100,
            allowed_types: vec!["pdf".to_string(), "exe".to_string()],
        });
        assert_eq!(policy.allowed(), &[DocumentKind::Pdf]);
        assert!(policy.check(&UploadFile::new("a.txt", vec![])).is_err());
    }
}
