//! Document synchronizer: the in-memory, paginated mirror of each owner's
//! documents and the operations that keep it consistent with the API.
//!
//! Each view (the dashboard, or an admin dialog showing another user) holds
//! one owner scope. Every page-1 load starts a new generation; a response is
//! applied only if its view still has the generation, owner and session
//! epoch it was issued under. Anything else is dropped as superseded.
//!
//! Uploads are prepended as soon as the server confirms them. Deletes are
//! applied only after the server confirms them; a failed delete changes
//! nothing.

use crate::error::{ApiError, DeleteError, DownloadError, FetchError, UploadError};
use crate::models::document::{DocumentListWire, DocumentWire, PreviewWire, UploadMetadataWire};
use crate::models::{DocumentId, DocumentKind, DocumentPage, DocumentRecord, Identity};
use crate::services::api_client::ApiClient;
use crate::services::cache::DOCUMENTS_KEY;
use crate::services::session::{SessionCell, SessionEvent};
use crate::utils::upload::{UploadFile, UploadPolicy};
use chrono::{DateTime, Duration, Utc};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A place in the UI that shows one owner's documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewId {
    /// The signed-in user's own documents.
    Dashboard,
    /// An admin dialog showing the documents of the user with this id.
    UserDialog(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page_number: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl Pagination {
    fn from_page(page: &DocumentPage) -> Self {
        Self {
            page_number: page.page_number,
            per_page: page.per_page,
            total_items: page.total_items,
            total_pages: page.total_pages,
        }
    }

    pub fn has_more(&self) -> bool {
        self.page_number < self.total_pages
    }

    fn adjust_total(&mut self, delta: i64) {
        self.total_items = self.total_items.saturating_add_signed(delta);
        if self.per_page > 0 {
            self.total_pages = self.total_items.div_ceil(u64::from(self.per_page)) as u32;
        }
    }
}

/// An upload the server has not confirmed yet. The placeholder id is local
/// only and is never accepted by delete or download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub placeholder_id: String,
    pub filename: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner_email: String,
    pub file: UploadFile,
    /// Label stored with the document. Defaults to the file's MIME type.
    pub document_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    Id(DocumentId),
    Filename(String),
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl DownloadedFile {
    /// Saves into `dir` without overwriting: `a.pdf`, then `a (1).pdf`, ...
    pub async fn save_into(&self, dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let name = Path::new(&self.filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("download");
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);
        let ext = Path::new(name).extension().and_then(|e| e.to_str());

        let mut candidate = dir.join(name);
        let mut n = 1;
        while tokio::fs::try_exists(&candidate).await? {
            let next = match ext {
                Some(ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            };
            candidate = dir.join(next);
            n += 1;
        }

        tokio::fs::write(&candidate, &self.bytes).await?;
        Ok(candidate)
    }
}

/// Local filter over the loaded documents of a view.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub term: Option<String>,
    pub kind: Option<DocumentKind>,
}

impl DocumentFilter {
    pub fn matches(&self, record: &DocumentRecord) -> bool {
        let term_ok = self.term.as_deref().map_or(true, |term| {
            record
                .filename
                .to_lowercase()
                .contains(&term.trim().to_lowercase())
        });
        let kind_ok = self.kind.map_or(true, |kind| {
            record.kind() == Some(kind) || DocumentKind::from_mime(&record.document_type) == Some(kind)
        });
        term_ok && kind_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentStats {
    /// Server total when known, else the number loaded.
    pub total_documents: u64,
    pub loaded: usize,
    /// Loaded documents created in the last 7 days.
    pub recent_uploads: usize,
}

/// Read-only copy of a view for rendering.
#[derive(Debug, Clone, Default)]
pub struct ViewSnapshot {
    pub owner: Option<String>,
    pub status: SyncStatus,
    pub documents: Vec<DocumentRecord>,
    pub pagination: Option<Pagination>,
    pub pending_uploads: Vec<PendingUpload>,
    pub last_error: Option<String>,
    /// Documents come from the warm-start cache and a live load is pending.
    pub from_cache: bool,
    pub generation: u64,
}

impl ViewSnapshot {
    pub fn is_busy(&self) -> bool {
        self.status == SyncStatus::Loading || !self.pending_uploads.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.pagination.is_some_and(|p| p.has_more())
    }

    pub fn filtered(&self, filter: &DocumentFilter) -> Vec<&DocumentRecord> {
        self.documents.iter().filter(|d| filter.matches(d)).collect()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> DocumentStats {
        let week_ago = now - Duration::days(7);
        DocumentStats {
            total_documents: self
                .pagination
                .map_or(self.documents.len() as u64, |p| p.total_items),
            loaded: self.documents.len(),
            recent_uploads: self
                .documents
                .iter()
                .filter(|d| d.created_at > week_ago)
                .count(),
        }
    }
}

/// Cached under `documents`; only valid for the owner it names.
#[derive(Debug, Serialize, Deserialize)]
struct WarmSnapshot {
    owner: String,
    documents: Vec<DocumentRecord>,
    pagination: Option<Pagination>,
}

#[derive(Debug, Default)]
struct ScopeView {
    owner: Option<String>,
    generation: u64,
    status: SyncStatus,
    documents: Vec<DocumentRecord>,
    pagination: Option<Pagination>,
    pending: Vec<PendingUpload>,
    last_error: Option<String>,
    from_cache: bool,
    upload_in_flight: bool,
}

impl ScopeView {
    fn reset_for(&mut self, owner: &str) {
        self.owner = Some(owner.to_string());
        self.documents.clear();
        self.pagination = None;
        self.pending.clear();
        self.last_error = None;
        self.from_cache = false;
    }

    fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            owner: self.owner.clone(),
            status: self.status,
            documents: self.documents.clone(),
            pagination: self.pagination,
            pending_uploads: self.pending.clone(),
            last_error: self.last_error.clone(),
            from_cache: self.from_cache,
            generation: self.generation,
        }
    }

    fn warm_snapshot(&self) -> Option<WarmSnapshot> {
        Some(WarmSnapshot {
            owner: self.owner.clone()?,
            documents: self.documents.clone(),
            pagination: self.pagination,
        })
    }

    fn append_unique(&mut self, items: Vec<DocumentRecord>) {
        let mut seen: HashSet<DocumentId> = self.documents.iter().map(|d| d.id).collect();
        self.documents
            .extend(items.into_iter().filter(|d| seen.insert(d.id)));
    }
}

#[derive(Debug, Default)]
struct SyncState {
    views: HashMap<ViewId, ScopeView>,
    last_generation: u64,
    deleting: HashSet<DocumentId>,
    downloading: HashSet<(String, String)>,
}

impl SyncState {
    fn next_generation(&mut self) -> u64 {
        self.last_generation += 1;
        self.last_generation
    }
}

/// What a fetch was issued for, compared again when it resolves.
#[derive(Debug)]
struct FetchTicket {
    view: ViewId,
    owner: String,
    page: u32,
    generation: u64,
    epoch: u64,
}

impl FetchTicket {
    fn is_current(&self, view: &ScopeView, epoch: u64) -> bool {
        if self.epoch != epoch
            || self.generation != view.generation
            || view.owner.as_deref() != Some(self.owner.as_str())
        {
            return false;
        }
        // An append is only valid directly after the page it extends.
        self.page == 1
            || view
                .pagination
                .is_some_and(|p| p.page_number + 1 == self.page)
    }
}

pub struct DocumentSynchronizer {
    api: Arc<ApiClient>,
    session: Arc<SessionCell>,
    policy: UploadPolicy,
    state: Mutex<SyncState>,
    // Revision counter, bumped after every state change.
    changes: watch::Sender<u64>,
}

impl DocumentSynchronizer {
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionCell>, policy: UploadPolicy) -> Self {
        Self {
            api,
            session,
            policy,
            state: Mutex::new(SyncState::default()),
            changes: watch::Sender::new(0),
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    /// Fires after every change to any view.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Waits until `view` exists and is not loading.
    pub async fn settled(&self, view: ViewId) -> ViewSnapshot {
        let mut changes = self.changes();
        loop {
            let current = self.state().views.get(&view).map(ScopeView::snapshot);
            if let Some(snapshot) = current.filter(|s| s.status != SyncStatus::Loading) {
                return snapshot;
            }
            if changes.changed().await.is_err() {
                return self.snapshot(view);
            }
        }
    }

    pub fn snapshot(&self, view: ViewId) -> ViewSnapshot {
        self.state()
            .views
            .get(&view)
            .map(ScopeView::snapshot)
            .unwrap_or_default()
    }

    /// Follows session transitions: loads the dashboard on sign-in and drops
    /// every view on sign-out.
    pub fn spawn_session_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.session.subscribe();
        let sync = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::SignedIn { identity, restored }) => {
                        tracing::debug!(email = %identity.email, restored, "Initializing documents");
                        sync.init_logged(&identity).await;
                    }
                    Ok(SessionEvent::SignedOut { reason }) => {
                        tracing::debug!(?reason, "Dropping document views");
                        sync.teardown();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Missed session events; resynchronizing");
                        match sync.session.identity() {
                            Some(identity) => sync.init_logged(&identity).await,
                            None => sync.teardown(),
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Starts the dashboard for `identity`: shows the warm-start snapshot if
    /// it belongs to this owner, then reconciles against the API.
    pub async fn init_for(&self, identity: &Identity) -> Result<DocumentPage, FetchError> {
        self.teardown();

        let warm = self
            .session
            .read(DOCUMENTS_KEY)
            .await
            .and_then(|raw| serde_json::from_str::<WarmSnapshot>(&raw).ok())
            .filter(|snapshot| snapshot.owner == identity.email);

        if let Some(warm) = warm {
            let mut state = self.state();
            let view = state.views.entry(ViewId::Dashboard).or_default();
            // A load may already have started while the cache was being read.
            if view.owner.is_none() {
                tracing::debug!(count = warm.documents.len(), "Showing cached documents");
                view.owner = Some(warm.owner);
                view.documents = warm.documents;
                view.pagination = warm.pagination;
                view.from_cache = true;
            }
            drop(state);
            self.touch();
        }

        self.fetch_page(ViewId::Dashboard, &identity.email, 1).await
    }

    async fn init_logged(&self, identity: &Identity) {
        match self.init_for(identity).await {
            Ok(_) | Err(FetchError::Superseded) => {}
            Err(e) => tracing::warn!(email = %identity.email, error = %e, "Initial document load failed"),
        }
    }

    /// Drops every view.
    pub fn teardown(&self) {
        self.state().views.clear();
        self.touch();
    }

    pub fn close_view(&self, view: ViewId) {
        self.state().views.remove(&view);
        self.touch();
    }

    /// Leaves the error state so the view can be retried.
    pub fn clear_error(&self, view: ViewId) {
        if let Some(v) = self.state().views.get_mut(&view) {
            if v.status == SyncStatus::Error {
                v.status = SyncStatus::Idle;
                v.last_error = None;
            }
        }
        self.touch();
    }

    /// Loads `page` (1-based) of `owner` into `view`.
    ///
    /// Page 1 replaces the view's documents (switching owner clears them
    /// first); later pages append. On failure the loaded documents stay.
    pub async fn fetch_page(
        &self,
        view: ViewId,
        owner: &str,
        page: u32,
    ) -> Result<DocumentPage, FetchError> {
        if page == 0 {
            return Err(FetchError::InvalidPage(page));
        }
        let epoch = self.session.epoch();
        if !self.session.current().is_authenticated() {
            return Err(FetchError::NotSignedIn);
        }

        let ticket = self.issue_fetch(view, owner, page, epoch)?;
        self.touch();
        tracing::debug!(?view, owner, page, generation = ticket.generation, "Fetching documents");

        let mut query = vec![("page", page.to_string())];
        if let Some(per_page) = self.api.settings().per_page {
            query.push(("per_page", per_page.to_string()));
        }
        let result = self
            .api
            .get_json::<DocumentListWire>(&["documents", "documents", owner], &query)
            .await
            .map(|wire| wire.into_page(owner));

        let applied = self.apply_fetch(&ticket, result);
        self.touch();
        let (page, warm) = applied?;
        if let Some(warm) = warm {
            self.write_warm(epoch, &warm).await;
        }
        Ok(page)
    }

    fn issue_fetch(
        &self,
        view: ViewId,
        owner: &str,
        page: u32,
        epoch: u64,
    ) -> Result<FetchTicket, FetchError> {
        let mut state = self.state();
        let generation = if page == 1 {
            Some(state.next_generation())
        } else {
            None
        };
        let v = state.views.entry(view).or_default();

        match generation {
            Some(generation) => {
                if v.owner.as_deref() != Some(owner) {
                    v.reset_for(owner);
                }
                v.generation = generation;
            }
            None => {
                if v.owner.as_deref() != Some(owner) {
                    return Err(FetchError::ScopeMismatch {
                        requested: owner.to_string(),
                    });
                }
                let expected = v.pagination.map_or(1, |p| p.page_number + 1);
                if page != expected {
                    return Err(FetchError::PageOutOfOrder {
                        expected,
                        requested: page,
                    });
                }
            }
        }
        v.status = SyncStatus::Loading;

        Ok(FetchTicket {
            view,
            owner: owner.to_string(),
            page,
            generation: v.generation,
            epoch,
        })
    }

    fn apply_fetch(
        &self,
        ticket: &FetchTicket,
        result: Result<DocumentPage, ApiError>,
    ) -> Result<(DocumentPage, Option<WarmSnapshot>), FetchError> {
        let dashboard_owner = self.session.identity().map(|i| i.email);
        let mut state = self.state();

        if matches!(result, Err(ApiError::SessionExpired)) {
            state.views.clear();
            return Err(FetchError::SessionExpired);
        }

        let epoch = self.session.epoch();
        let Some(v) = state.views.get_mut(&ticket.view) else {
            return Err(FetchError::Superseded);
        };
        if !ticket.is_current(v, epoch) {
            tracing::debug!(
                view = ?ticket.view,
                owner = %ticket.owner,
                page = ticket.page,
                generation = ticket.generation,
                "Discarding superseded document page"
            );
            return Err(FetchError::Superseded);
        }

        match result {
            Ok(page) => {
                if ticket.page == 1 {
                    v.documents.clear();
                }
                v.append_unique(page.items.clone());
                v.pagination = Some(Pagination::from_page(&page));
                v.status = SyncStatus::Ready;
                v.last_error = None;
                v.from_cache = false;

                let warm = (ticket.view == ViewId::Dashboard
                    && dashboard_owner.as_deref() == Some(ticket.owner.as_str()))
                .then(|| v.warm_snapshot())
                .flatten();
                Ok((page, warm))
            }
            Err(e) => {
                let err = FetchError::from(e);
                tracing::warn!(owner = %ticket.owner, page = ticket.page, error = %err, "Document fetch failed");
                v.status = SyncStatus::Error;
                v.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    async fn write_warm(&self, epoch: u64, warm: &WarmSnapshot) {
        match serde_json::to_string(warm) {
            Ok(json) => {
                self.session
                    .write_if_current(epoch, DOCUMENTS_KEY, json)
                    .await;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode document snapshot"),
        }
    }

    /// Switches `view` to `owner` and loads their first page.
    pub async fn select_scope(&self, view: ViewId, owner: &str) -> Result<DocumentPage, FetchError> {
        self.fetch_page(view, owner, 1).await
    }

    /// Reloads page 1 of the view's current owner.
    pub async fn refresh(&self, view: ViewId) -> Result<DocumentPage, FetchError> {
        let owner = self.snapshot(view).owner.ok_or(FetchError::NothingLoaded)?;
        self.fetch_page(view, &owner, 1).await
    }

    /// Loads the page after the last one loaded.
    pub async fn load_more(&self, view: ViewId) -> Result<DocumentPage, FetchError> {
        let snapshot = self.snapshot(view);
        let (Some(owner), Some(pagination)) = (snapshot.owner, snapshot.pagination) else {
            return Err(FetchError::NothingLoaded);
        };
        if !pagination.has_more() {
            return Err(FetchError::NoMorePages);
        }
        self.fetch_page(view, &owner, pagination.page_number + 1).await
    }

    /// Uploads a file for `request.owner_email` and prepends the confirmed
    /// record to `view`. Type and size are checked before anything else.
    pub async fn upload(
        &self,
        view: ViewId,
        request: UploadRequest,
    ) -> Result<DocumentRecord, UploadError> {
        let kind = self.policy.check(&request.file)?;

        let epoch = self.session.epoch();
        if !self.session.current().is_authenticated() {
            return Err(UploadError::NotSignedIn);
        }

        let owner = request.owner_email;
        let file = request.file;
        let placeholder = PendingUpload {
            placeholder_id: Utc::now().timestamp_millis().to_string(),
            filename: file.filename.clone(),
            started_at: Utc::now(),
        };
        let _slot = self.claim_upload(view, placeholder.clone())?;

        let document_type = request
            .document_type
            .unwrap_or_else(|| kind.mime_type().to_string());
        let metadata = serde_json::to_string(&UploadMetadataWire {
            filename: &file.filename,
            document_type: &document_type,
            email: &owner,
        })
        .map_err(|e| UploadError::Transport(e.to_string()))?;

        let mime = file
            .content_type
            .clone()
            .unwrap_or_else(|| kind.mime_type().to_string());
        let filename = file.filename.clone();
        let part = Part::bytes(file.bytes)
            .file_name(filename.clone())
            .mime_str(&mime)
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        let form = Form::new().part("file", part).text("document", metadata);

        tracing::info!(?view, owner = %owner, filename = %filename, "Uploading document");
        let result = self
            .api
            .post_multipart::<DocumentWire>(&["documents", "upload"], form)
            .await;

        let record = match result {
            Ok(wire) => wire.into_record(&owner),
            Err(ApiError::SessionExpired) => {
                self.teardown();
                return Err(UploadError::SessionExpired);
            }
            Err(e) => {
                tracing::warn!(owner = %owner, filename = %filename, error = %e, "Upload failed");
                return Err(e.into());
            }
        };

        let warm = {
            let dashboard_owner = self.session.identity().map(|i| i.email);
            let mut state = self.state();
            match state.views.get_mut(&view) {
                Some(v)
                    if epoch == self.session.epoch()
                        && v.owner.as_deref() == Some(owner.as_str()) =>
                {
                    v.pending
                        .retain(|p| p.placeholder_id != placeholder.placeholder_id);
                    v.documents.retain(|d| d.id != record.id);
                    v.documents.insert(0, record.clone());
                    if let Some(p) = v.pagination.as_mut() {
                        p.adjust_total(1);
                    }
                    (view == ViewId::Dashboard && dashboard_owner.as_deref() == Some(owner.as_str()))
                        .then(|| v.warm_snapshot())
                        .flatten()
                }
                _ => {
                    tracing::debug!(owner = %owner, "Upload finished after the view moved on");
                    None
                }
            }
        };
        self.touch();
        if let Some(warm) = warm {
            self.write_warm(epoch, &warm).await;
        }

        tracing::info!(id = %record.id, filename = %record.filename, "Document uploaded");
        Ok(record)
    }

    fn claim_upload(
        &self,
        view: ViewId,
        placeholder: PendingUpload,
    ) -> Result<UploadSlot<'_>, UploadError> {
        let mut state = self.state();
        let v = state.views.entry(view).or_default();
        if v.upload_in_flight {
            return Err(UploadError::InFlight);
        }
        v.upload_in_flight = true;
        let placeholder_id = placeholder.placeholder_id.clone();
        v.pending.push(placeholder);
        drop(state);
        self.touch();
        Ok(UploadSlot {
            sync: self,
            view,
            placeholder_id,
        })
    }

    /// Deletes a document on the server, then removes it from every view.
    /// Nothing changes locally unless the server confirms.
    pub async fn delete(&self, id: DocumentId) -> Result<(), DeleteError> {
        let epoch = self.session.epoch();
        if !self.session.current().is_authenticated() {
            return Err(DeleteError::NotSignedIn);
        }

        let _slot = {
            let mut state = self.state();
            if !state.deleting.insert(id) {
                return Err(DeleteError::InFlight(id));
            }
            DeleteSlot { sync: self, id }
        };

        tracing::info!(%id, "Deleting document");
        if let Err(e) = self.api.delete(&["documents", "delete", &id.to_string()]).await {
            if matches!(e, ApiError::SessionExpired) {
                self.teardown();
            }
            let err = DeleteError::from_api(id, e);
            tracing::warn!(%id, error = %err, "Delete failed; keeping document");
            return Err(err);
        }

        let warm = {
            let dashboard_owner = self.session.identity().map(|i| i.email);
            let mut state = self.state();
            let mut warm = None;
            for (view_id, v) in state.views.iter_mut() {
                let before = v.documents.len();
                v.documents.retain(|d| d.id != id);
                if v.documents.len() == before {
                    continue;
                }
                if let Some(p) = v.pagination.as_mut() {
                    p.adjust_total(-1);
                }
                if *view_id == ViewId::Dashboard && v.owner == dashboard_owner {
                    warm = v.warm_snapshot();
                }
            }
            warm
        };
        self.touch();
        if let Some(warm) = warm {
            self.write_warm(epoch, &warm).await;
        }

        tracing::info!(%id, "Document deleted");
        Ok(())
    }

    /// Fetches the raw content of a document. Views are not modified.
    pub async fn download(
        &self,
        target: DownloadTarget,
        owner: &str,
    ) -> Result<DownloadedFile, DownloadError> {
        if !self.session.current().is_authenticated() {
            return Err(DownloadError::NotSignedIn);
        }

        let filename = match target {
            DownloadTarget::Filename(filename) => filename,
            DownloadTarget::Id(id) => self
                .find(id)
                .map(|d| d.filename)
                .ok_or(DownloadError::UnknownDocument(id))?,
        };

        let key = (owner.to_string(), filename.clone());
        let _slot = {
            let mut state = self.state();
            if !state.downloading.insert(key.clone()) {
                return Err(DownloadError::InFlight(filename));
            }
            DownloadSlot { sync: self, key }
        };

        tracing::info!(owner, filename = %filename, "Downloading document");
        let body = self
            .api
            .get_bytes(&["documents", "download", owner, &filename])
            .await
            .map_err(|e| {
                if matches!(e, ApiError::SessionExpired) {
                    self.teardown();
                }
                DownloadError::from_api(&filename, e)
            })?;

        let content_type = body
            .content_type
            .clone()
            .or_else(|| DocumentKind::from_filename(&filename).map(|k| k.mime_type().to_string()))
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(DownloadedFile {
            filename: body.attachment_name().unwrap_or(filename),
            content_type,
            bytes: body.bytes,
        })
    }

    /// Asks the API for a shareable preview link of a stored file.
    pub async fn preview_url(&self, owner: &str, filename: &str) -> Result<String, DownloadError> {
        if !self.session.current().is_authenticated() {
            return Err(DownloadError::NotSignedIn);
        }
        let preview: PreviewWire = self
            .api
            .get_json(&["documents", "preview", owner, filename], &[])
            .await
            .map_err(|e| DownloadError::from_api(filename, e))?;
        Ok(preview.preview_url)
    }

    /// Looks a document up across all views.
    pub fn find(&self, id: DocumentId) -> Option<DocumentRecord> {
        self.state()
            .views
            .values()
            .flat_map(|v| v.documents.iter())
            .find(|d| d.id == id)
            .cloned()
    }
}

/// Releases a view's upload slot and its placeholder.
struct UploadSlot<'a> {
    sync: &'a DocumentSynchronizer,
    view: ViewId,
    placeholder_id: String,
}

impl Drop for UploadSlot<'_> {
    fn drop(&mut self) {
        let mut state = self.sync.state();
        let unowned = match state.views.get_mut(&self.view) {
            Some(v) => {
                v.upload_in_flight = false;
                v.pending.retain(|p| p.placeholder_id != self.placeholder_id);
                v.owner.is_none() && v.pending.is_empty()
            }
            None => false,
        };
        // The slot opened the view only to show its placeholder.
        if unowned {
            state.views.remove(&self.view);
        }
        drop(state);
        self.sync.touch();
    }
}

struct DeleteSlot<'a> {
    sync: &'a DocumentSynchronizer,
    id: DocumentId,
}

impl Drop for DeleteSlot<'_> {
    fn drop(&mut self) {
        self.sync.state().deleting.remove(&self.id);
    }
}

struct DownloadSlot<'a> {
    sync: &'a DocumentSynchronizer,
    key: (String, String),
}

impl Drop for DownloadSlot<'_> {
    fn drop(&mut self) {
        self.sync.state().downloading.remove(&self.key);
    }
}
