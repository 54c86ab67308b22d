//! Admin-only lookups: user search and the recent-uploads feed.

use crate::error::FetchError;
use crate::models::document::RecentUploadWire;
use crate::models::user::UserSummaryWire;
use crate::models::{DocumentPage, UserSummary};
use crate::services::api_client::ApiClient;
use crate::services::session::SessionCell;
use std::sync::Arc;

pub const DEFAULT_RECENT_LIMIT: u32 = 10;

pub struct AdminDirectory {
    api: Arc<ApiClient>,
    session: Arc<SessionCell>,
}

impl AdminDirectory {
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionCell>) -> Self {
        Self { api, session }
    }

    fn ensure_admin(&self) -> Result<(), FetchError> {
        let session = self.session.current();
        if !session.is_authenticated() {
            return Err(FetchError::NotSignedIn);
        }
        if !session.is_admin() {
            return Err(FetchError::Forbidden);
        }
        Ok(())
    }

    /// Matches users by email or full name. A blank query matches nobody and
    /// is answered locally.
    pub async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, FetchError> {
        self.ensure_admin()?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let users: Vec<UserSummaryWire> = self
            .api
            .get_json(&["documents", "users", "search", query], &[])
            .await?;
        tracing::debug!(query, count = users.len(), "User search");
        Ok(users.into_iter().map(UserSummary::from).collect())
    }

    /// Latest uploads across all users, newest first, as a single page.
    pub async fn recent_uploads(&self, limit: u32) -> Result<DocumentPage, FetchError> {
        self.ensure_admin()?;
        let limit = limit.max(1);

        let uploads: Vec<RecentUploadWire> = self
            .api
            .get_json(&["documents", "recent-uploads"], &[("limit", limit.to_string())])
            .await?;

        let items: Vec<_> = uploads.into_iter().map(RecentUploadWire::into_record).collect();
        let total_items = items.len() as u64;
        Ok(DocumentPage {
            items,
            page_number: 1,
            per_page: limit,
            total_items,
            total_pages: 1,
        })
    }
}
