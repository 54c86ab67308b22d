use crate::config::Settings;
use crate::error::ApiError;
use crate::services::FileCache;
use crate::utils::UploadPolicy;
use crate::AppState;
use std::sync::Arc;

/// Builds the application state from configuration, persisting the session
/// in the configured cache file.
pub fn build_state(settings: &Settings) -> Result<AppState, ApiError> {
    let cache = Arc::new(FileCache::new(settings.cache.path.clone()));
    let policy = UploadPolicy::from_settings(&settings.uploads);

    tracing::debug!(
        base_url = %settings.api.base_url,
        cache = %settings.cache.path.display(),
        "Building client state"
    );
    AppState::build(settings.api.clone(), cache, policy)
}
