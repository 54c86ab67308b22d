pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod services;
pub mod startup;
pub mod utils;

use config::ApiSettings;
use error::ApiError;
use middleware::RouteGuard;
use models::Session;
use services::{AdminDirectory, ApiClient, DocumentSynchronizer, DurableCache, SessionCell, SessionStore};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use utils::UploadPolicy;

/// Shared application state: one session store, one document synchronizer,
/// one admin directory and one route guard over a single API client.
///
/// Lifecycle is `build` → `restore` → `teardown`.
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<ApiClient>,
    pub session: SessionStore,
    pub documents: Arc<DocumentSynchronizer>,
    pub admin: Arc<AdminDirectory>,
    pub guard: RouteGuard,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AppState {
    pub fn build(
        api_settings: ApiSettings,
        cache: Arc<dyn DurableCache>,
        policy: UploadPolicy,
    ) -> Result<Self, ApiError> {
        let cell = SessionCell::new(cache);
        let api = Arc::new(ApiClient::new(api_settings, cell.clone())?);

        Ok(Self {
            session: SessionStore::new(cell.clone(), api.clone()),
            documents: Arc::new(DocumentSynchronizer::new(api.clone(), cell.clone(), policy)),
            admin: Arc::new(AdminDirectory::new(api.clone(), cell.clone())),
            guard: RouteGuard::new(cell),
            api,
            listener: Arc::new(Mutex::new(None)),
        })
    }

    /// Lets the document synchronizer follow sign-in and sign-out on its own.
    /// Must run inside a Tokio runtime. Calling it twice has no effect.
    pub fn start_sync(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if listener.is_none() {
            *listener = Some(self.documents.spawn_session_listener());
        }
    }

    /// Restores the cached session, if any.
    pub async fn restore(&self) -> Option<Session> {
        self.session.restore().await
    }

    /// Stops background work and drops in-memory document state. The durable
    /// cache is kept so the next start can restore.
    pub fn teardown(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.documents.teardown();
    }
}
