use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Server-assigned document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub filename: String,
    pub document_type: String,
    pub owner_email: String,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Kind derived from the filename extension, if it is a known one.
    pub fn kind(&self) -> Option<DocumentKind> {
        DocumentKind::from_filename(&self.filename)
    }
}

/// One page of documents for a single owner, as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPage {
    pub items: Vec<DocumentRecord>,
    pub page_number: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl DocumentPage {
    pub fn has_more(&self) -> bool {
        self.page_number < self.total_pages
    }
}

/// Document kinds accepted by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Txt,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [DocumentKind::Pdf, DocumentKind::Docx, DocumentKind::Txt];

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
            DocumentKind::Txt => "txt",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentKind::Txt => "text/plain",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.extension() == ext)
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.split(';').next().unwrap_or_default().trim();
        Self::ALL
            .into_iter()
            .find(|k| k.mime_type().eq_ignore_ascii_case(mime))
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// Wire shapes of the document API.

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentWire {
    pub id: i64,
    pub filename: String,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl DocumentWire {
    /// Fills fields the server omitted from the scope the record was requested for.
    pub fn into_record(self, scope_owner: &str) -> DocumentRecord {
        let owner_email = self.email.unwrap_or_else(|| scope_owner.to_string());
        DocumentRecord {
            id: DocumentId(self.id),
            filename: self.filename,
            document_type: self.document_type.unwrap_or_else(|| "unknown".to_string()),
            uploaded_by: self.uploaded_by.unwrap_or_else(|| owner_email.clone()),
            owner_email,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentListWire {
    pub documents: Vec<DocumentWire>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl DocumentListWire {
    pub fn into_page(self, scope_owner: &str) -> DocumentPage {
        DocumentPage {
            items: self
                .documents
                .into_iter()
                .map(|d| d.into_record(scope_owner))
                .collect(),
            page_number: self.page,
            per_page: self.per_page,
            total_items: self.total,
            total_pages: self.total_pages,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadMetadataWire<'a> {
    pub filename: &'a str,
    pub document_type: &'a str,
    pub email: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentUploadWire {
    pub id: i64,
    pub filename: String,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    pub user: RecentUploadOwnerWire,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentUploadOwnerWire {
    pub email: String,
    #[allow(dead_code)]
    #[serde(default)]
    pub fullname: Option<String>,
}

impl RecentUploadWire {
    pub fn into_record(self) -> DocumentRecord {
        DocumentWire {
            id: self.id,
            filename: self.filename,
            document_type: self.document_type,
            email: Some(self.user.email),
            uploaded_by: None,
            created_at: self.created_at,
        }
        .into_record("")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PreviewWire {
    pub preview_url: String,
}

/// Accepts RFC 3339 timestamps and the naive ISO form the API emits for UTC values.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_wire_maps_to_page() {
        let wire: DocumentListWire = serde_json::from_value(json!({
            "documents": [{
                "id": 7,
                "filename": "lease.pdf",
                "document_type": "application/pdf",
                "email": "a@example.com",
                "uploaded_by": "admin@example.com",
                "created_at": "2024-04-03T10:15:30.123456"
            }],
            "total": 11,
            "page": 1,
            "per_page": 5,
            "total_pages": 3
        }))
        .unwrap();

        let page = wire.into_page("a@example.com");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, DocumentId(7));
        assert_eq!(page.items[0].uploaded_by, "admin@example.com");
        assert_eq!(page.total_items, 11);
        assert!(page.has_more());
    }

    #[test]
    fn missing_owner_falls_back_to_scope() {
        let wire: DocumentWire = serde_json::from_value(json!({
            "id": 1,
            "filename": "notes.txt",
            "created_at": null
        }))
        .unwrap();

        let record = wire.into_record("b@example.com");
        assert_eq!(record.owner_email, "b@example.com");
        assert_eq!(record.uploaded_by, "b@example.com");
        assert_eq!(record.document_type, "unknown");
    }

    #[test]
    fn timestamps_accept_offset_and_naive_forms() {
        let a = parse_timestamp("2024-04-01T00:00:00Z").unwrap();
        let b = parse_timestamp("2024-04-01T00:00:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn kind_lookup_is_case_insensitive() {
        assert_eq!(DocumentKind::from_filename("Deed.PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension(".docx"), Some(DocumentKind::Docx));
        assert_eq!(
            DocumentKind::from_mime("text/plain; charset=utf-8"),
            Some(DocumentKind::Txt)
        );
        assert_eq!(DocumentKind::from_filename("photo.png"), None);
    }
}
