use crate::cli::ListArgs;
use crate::error::{FetchError, UploadError};
use crate::handlers::auth::require;
use crate::handlers::notify::{report, Notification, Notify};
use crate::middleware::Route;
use crate::models::{DocumentId, DocumentKind};
use crate::services::{
    DocumentFilter, DocumentSynchronizer, DownloadTarget, UploadRequest, ViewId, ViewSnapshot,
};
use crate::utils::UploadFile;
use crate::AppState;
use anyhow::anyhow;
use chrono::Utc;
use std::path::Path;

pub async fn list(state: &AppState, args: &ListArgs) -> anyhow::Result<()> {
    let identity = require(state, Route::Dashboard).await?;
    let filter = DocumentFilter {
        term: args.filter.clone(),
        kind: parse_kind(args.kind.as_deref())?,
    };

    if let Err(e) = state.documents.init_for(&identity).await {
        let snapshot = state.documents.snapshot(ViewId::Dashboard);
        if snapshot.documents.is_empty() {
            return Err(report(e));
        }
        // Keep showing what is already loaded.
        if let Some(notification) = e.notification() {
            eprintln!("{}", notification);
        }
        render(&snapshot, &filter);
        return Ok(());
    }

    if args.all {
        load_all(&state.documents, ViewId::Dashboard).await?;
    }
    render(&state.documents.snapshot(ViewId::Dashboard), &filter);
    Ok(())
}

pub async fn upload(
    state: &AppState,
    path: &Path,
    document_type: Option<String>,
) -> anyhow::Result<()> {
    let identity = require(state, Route::Dashboard).await?;
    let file = UploadFile::from_path(path)
        .await
        .map_err(|e| report(UploadError::Io(e)))?;

    let record = state
        .documents
        .upload(
            ViewId::Dashboard,
            UploadRequest {
                owner_email: identity.email,
                file,
                document_type,
            },
        )
        .await
        .map_err(report)?;

    println!(
        "{}",
        Notification::success(
            "Upload complete",
            format!("{} uploaded (id {})", record.filename, record.id)
        )
    );
    Ok(())
}

pub async fn remove(state: &AppState, id: i64) -> anyhow::Result<()> {
    require(state, Route::Dashboard).await?;
    state.documents.delete(DocumentId(id)).await.map_err(report)?;
    println!(
        "{}",
        Notification::success("Document deleted", format!("Document {} removed", id))
    );
    Ok(())
}

pub async fn download(state: &AppState, target: &str, out: &Path) -> anyhow::Result<()> {
    let identity = require(state, Route::Dashboard).await?;

    let target = match target.parse::<i64>() {
        Ok(id) => {
            let id = DocumentId(id);
            locate(&state.documents, &identity.email, id).await?;
            DownloadTarget::Id(id)
        }
        Err(_) => DownloadTarget::Filename(target.to_string()),
    };

    let file = state
        .documents
        .download(target, &identity.email)
        .await
        .map_err(report)?;
    let saved = file.save_into(out).await?;
    println!(
        "{}",
        Notification::success(
            "Download complete",
            format!("{} ({} bytes) saved to {}", file.filename, file.bytes.len(), saved.display())
        )
    );
    Ok(())
}

pub async fn preview(state: &AppState, filename: &str) -> anyhow::Result<()> {
    let identity = require(state, Route::Documents).await?;
    let url = state
        .documents
        .preview_url(&identity.email, filename)
        .await
        .map_err(report)?;
    println!("{}", url);
    Ok(())
}

pub async fn stats(state: &AppState) -> anyhow::Result<()> {
    let identity = require(state, Route::Dashboard).await?;
    state.documents.init_for(&identity).await.map_err(report)?;

    let stats = state.documents.snapshot(ViewId::Dashboard).stats(Utc::now());
    println!("Total documents:   {}", stats.total_documents);
    println!("Loaded:            {}", stats.loaded);
    println!("Uploaded (7 days): {}", stats.recent_uploads);
    Ok(())
}

/// Loads pages until `id` is in memory or the owner has no more pages.
async fn locate(sync: &DocumentSynchronizer, owner: &str, id: DocumentId) -> anyhow::Result<()> {
    sync.fetch_page(ViewId::Dashboard, owner, 1)
        .await
        .map_err(report)?;
    while sync.find(id).is_none() {
        match sync.load_more(ViewId::Dashboard).await {
            Ok(_) => {}
            Err(FetchError::NoMorePages) => break,
            Err(e) => return Err(report(e)),
        }
    }
    Ok(())
}

pub(crate) async fn load_all(sync: &DocumentSynchronizer, view: ViewId) -> anyhow::Result<()> {
    while sync.snapshot(view).has_more() {
        sync.load_more(view).await.map_err(report)?;
    }
    Ok(())
}

pub(crate) fn parse_kind(kind: Option<&str>) -> anyhow::Result<Option<DocumentKind>> {
    kind.map(|k| {
        DocumentKind::from_extension(k).ok_or_else(|| anyhow!("Unknown document kind {}", k))
    })
    .transpose()
}

pub(crate) fn render(snapshot: &ViewSnapshot, filter: &DocumentFilter) {
    let rows = snapshot.filtered(filter);
    if rows.is_empty() {
        println!("No documents");
    } else {
        println!("{:>6}  {:<40}  {:<17}  {}", "ID", "FILENAME", "UPLOADED", "BY");
        for d in &rows {
            println!(
                "{:>6}  {:<40}  {:<17}  {}",
                d.id,
                d.filename,
                d.created_at.format("%Y-%m-%d %H:%M"),
                d.uploaded_by
            );
        }
    }

    if let Some(p) = snapshot.pagination {
        println!(
            "Showing {} of {} (page {}/{})",
            snapshot.documents.len(),
            p.total_items,
            p.page_number,
            p.total_pages.max(1)
        );
    }
    if snapshot.from_cache {
        println!("(cached copy; the live list could not be loaded)");
    }
}
