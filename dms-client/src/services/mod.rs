pub mod admin;
pub mod api_client;
pub mod cache;
pub mod documents;
pub mod session;

pub use admin::AdminDirectory;
pub use api_client::ApiClient;
pub use cache::{DurableCache, FileCache, MemoryCache};
pub use documents::{
    DocumentFilter, DocumentStats, DocumentSynchronizer, DownloadTarget, DownloadedFile, Pagination,
    PendingUpload, SyncStatus, UploadRequest, ViewId, ViewSnapshot,
};
pub use session::{SessionCell, SessionEvent, SessionStore, SignOutReason};
