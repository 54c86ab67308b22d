//! Session store: who is signed in, persisted across restarts.

use crate::error::{AuthError, CacheError};
use crate::models::user::{AuthResponseWire, MessageWire};
use crate::models::{Identity, LoginRequest, Session, SessionStatus, SignupRequest};
use crate::services::api_client::ApiClient;
use crate::services::cache::{DurableCache, ALL_KEYS, DOCUMENTS_KEY, TOKEN_KEY, USER_KEY};
use crate::utils::jwt::decode_jwt_claims;
use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, Secret};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use validator::Validate;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    UserRequested,
    /// The API rejected the credential (401).
    Expired,
}

/// Session transitions, broadcast to downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { identity: Identity, restored: bool },
    SignedOut { reason: SignOutReason },
}

/// Shared session state, owned jointly by the store and the API client.
///
/// `epoch` increases on every sign-in and sign-out. Work started under one
/// epoch must not publish results once it has moved on.
pub struct SessionCell {
    session: watch::Sender<Session>,
    restored: watch::Sender<bool>,
    epoch: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
    cache: Arc<dyn DurableCache>,
    // Serializes cache writes with epoch changes.
    cache_gate: Mutex<()>,
}

impl SessionCell {
    pub fn new(cache: Arc<dyn DurableCache>) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            session: watch::Sender::new(Session::signed_out()),
            restored: watch::Sender::new(false),
            epoch: AtomicU64::new(0),
            events,
            cache,
            cache_gate: Mutex::new(()),
        })
    }

    pub fn current(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn identity(&self) -> Option<Identity> {
        self.session.borrow().identity().cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn watch_restored(&self) -> watch::Receiver<bool> {
        self.restored.subscribe()
    }

    pub fn is_restored(&self) -> bool {
        *self.restored.borrow()
    }

    pub fn cache(&self) -> &Arc<dyn DurableCache> {
        &self.cache
    }

    pub(crate) fn credential(&self) -> Option<Secret<String>> {
        self.session.borrow().credential().cloned()
    }

    fn mark_restored(&self) {
        self.restored.send_replace(true);
    }

    /// Global 401 path. Ignored when the rejected request belonged to an
    /// earlier session.
    pub(crate) async fn expire(&self, issued_epoch: u64) {
        if issued_epoch != self.epoch() {
            tracing::debug!(issued_epoch, "Ignoring 401 from a previous session");
            return;
        }
        self.sign_out(SignOutReason::Expired).await;
    }

    /// Clears the in-memory session and every cache key. Returns whether a
    /// session was actually ended. Cache failures are logged, never raised.
    pub(crate) async fn sign_out(&self, reason: SignOutReason) -> bool {
        let _gate = self.cache_gate.lock().await;

        let was_signed_in = self.session.borrow().status() != SessionStatus::Unauthenticated;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.session.send_replace(Session::signed_out());

        if let Err(e) = self.cache.remove_many(&ALL_KEYS).await {
            tracing::error!(error = %e, "Failed to clear durable cache during sign-out");
        }

        if was_signed_in {
            tracing::info!(?reason, "Signed out");
            let _ = self.events.send(SessionEvent::SignedOut { reason });
        }
        was_signed_in
    }

    /// Persists and publishes a new session, unless the cell has moved past
    /// `issued_epoch` (a sign-out happened while the login was pending). On a
    /// failed write the previous entries are put back.
    async fn persist_and_sign_in(
        &self,
        issued_epoch: u64,
        identity: Identity,
        token: Secret<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AuthError> {
        let _gate = self.cache_gate.lock().await;
        if issued_epoch != self.epoch() {
            return Err(AuthError::Superseded);
        }

        let previous_user = self.cache.get(USER_KEY).await?;
        let previous_token = self.cache.get(TOKEN_KEY).await?;

        let user_json = serde_json::to_string(&identity).map_err(CacheError::from)?;
        let persisted = match self.cache.set(USER_KEY, user_json).await {
            Ok(()) => {
                self.cache
                    .set(TOKEN_KEY, token.expose_secret().clone())
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            self.put_back(USER_KEY, previous_user).await;
            self.put_back(TOKEN_KEY, previous_token).await;
            return Err(e.into());
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.session
            .send_replace(Session::authenticated(identity.clone(), token, expires_at));
        let _ = self.events.send(SessionEvent::SignedIn {
            identity,
            restored: false,
        });
        Ok(())
    }

    async fn put_back(&self, key: &str, value: Option<String>) {
        let result = match value {
            Some(value) => self.cache.set(key, value).await,
            None => self.cache.remove_many(&[key]).await,
        };
        if let Err(e) = result {
            tracing::error!(key, error = %e, "Failed to restore cache entry after a failed sign-in");
        }
    }

    /// Writes `value` under `key` only if the session is still on `epoch`.
    pub(crate) async fn write_if_current(&self, epoch: u64, key: &str, value: String) -> bool {
        let _gate = self.cache_gate.lock().await;
        if epoch != self.epoch() {
            return false;
        }
        match self.cache.set(key, value).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to write cache entry");
                false
            }
        }
    }

    pub(crate) async fn read(&self, key: &str) -> Option<String> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read cache entry");
                None
            }
        }
    }
}

/// Sign-in, sign-out and restore.
#[derive(Clone)]
pub struct SessionStore {
    cell: Arc<SessionCell>,
    api: Arc<ApiClient>,
    login_in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag even if the login future is dropped.
struct LoginGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for LoginGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl SessionStore {
    pub fn new(cell: Arc<SessionCell>, api: Arc<ApiClient>) -> Self {
        Self {
            cell,
            api,
            login_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cell(&self) -> &Arc<SessionCell> {
        &self.cell
    }

    pub fn current(&self) -> Session {
        self.cell.current()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.cell.subscribe()
    }

    /// Signs in. Only one attempt may be in flight; on any failure the
    /// previous session (if any) is left exactly as it was.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        request.validate()?;

        if self
            .login_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(email = %request.email, "Rejected concurrent sign-in attempt");
            return Err(AuthError::LoginInProgress);
        }
        let _guard = LoginGuard {
            flag: &self.login_in_flight,
        };

        // A held session stays authenticated until the new one replaces it.
        let showed_authenticating = self.cell.session.send_if_modified(|session| {
            if session.status() == SessionStatus::Unauthenticated {
                *session = Session::authenticating();
                true
            } else {
                false
            }
        });

        let result = self.authenticate(&request).await;

        if result.is_err() && showed_authenticating {
            self.cell.session.send_if_modified(|session| {
                if session.status() == SessionStatus::Authenticating {
                    *session = Session::signed_out();
                    true
                } else {
                    false
                }
            });
        }

        result
    }

    async fn authenticate(&self, request: &LoginRequest) -> Result<Session, AuthError> {
        let issued_epoch = self.cell.epoch();
        let response: AuthResponseWire = self
            .api
            .post_public(&["auth", "login"], request)
            .await
            .map_err(|e| {
                tracing::warn!(email = %request.email, error = %e, "Sign-in failed");
                AuthError::from(e)
            })?;

        let expires_at = token_expiry(&response.access_token, &request.email);
        let identity = Identity {
            email: request.email.clone(),
            role: response.role,
        };

        self.cell
            .persist_and_sign_in(
                issued_epoch,
                identity.clone(),
                Secret::new(response.access_token),
                expires_at,
            )
            .await
            .map_err(|e| {
                tracing::warn!(email = %request.email, error = %e, "Sign-in not applied");
                e
            })?;

        tracing::info!(email = %identity.email, role = ?identity.role, "Signed in");
        Ok(self.cell.current())
    }

    pub async fn signup(
        &self,
        email: &str,
        fullname: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        let request = SignupRequest {
            email: email.trim().to_string(),
            fullname: fullname.trim().to_string(),
            password: password.to_string(),
        };
        request.validate()?;

        let response: MessageWire = self
            .api
            .post_public(&["auth", "signup"], &request)
            .await?;

        tracing::info!(email = %request.email, "Account created");
        Ok(response.message)
    }

    /// Signs out. Idempotent, and never fails: remote revocation is best
    /// effort and local sign-out always completes.
    pub async fn logout(&self) {
        if let Some(path) = self.api.settings().logout_path.as_deref() {
            if self.cell.credential().is_some() {
                if let Err(e) = self.api.post_authorized_path(path).await {
                    tracing::warn!(error = %e, "Failed to revoke token during sign-out");
                }
            }
        }

        self.cell.sign_out(SignOutReason::UserRequested).await;
    }

    /// Reads the durable cache once at startup. A cached session is trusted
    /// without a network round-trip; a revoked token surfaces as a 401 on the
    /// first authenticated request.
    pub async fn restore(&self) -> Option<Session> {
        if self.cell.is_restored() {
            let current = self.cell.current();
            return current.is_authenticated().then_some(current);
        }

        let restored = self.read_cached_session().await;
        if let Some(session) = &restored {
            let _gate = self.cell.cache_gate.lock().await;
            self.cell.epoch.fetch_add(1, Ordering::SeqCst);
            self.cell.session.send_replace(session.clone());
            if let Some(identity) = session.identity() {
                tracing::info!(email = %identity.email, "Restored cached session");
                let _ = self.cell.events.send(SessionEvent::SignedIn {
                    identity: identity.clone(),
                    restored: true,
                });
            }
        }

        self.cell.mark_restored();
        restored
    }

    async fn read_cached_session(&self) -> Option<Session> {
        let token = self.cell.read(TOKEN_KEY).await?;
        let user = self.cell.read(USER_KEY).await?;

        let identity: Identity = match serde_json::from_str(&user) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable cached user");
                let _ = self
                    .cell
                    .cache
                    .remove_many(&[TOKEN_KEY, USER_KEY, DOCUMENTS_KEY])
                    .await;
                return None;
            }
        };

        let expires_at = token_expiry(&token, &identity.email);
        Some(Session::authenticated(identity, Secret::new(token), expires_at))
    }
}

fn token_expiry(token: &str, email: &str) -> Option<DateTime<Utc>> {
    match decode_jwt_claims(token) {
        Ok(claims) => {
            if claims.sub.as_deref().is_some_and(|sub| sub != email) {
                tracing::warn!(email, subject = ?claims.sub, "Token subject does not match email");
            }
            claims.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
        }
        Err(e) => {
            tracing::debug!(error = %e, "Access token carries no readable claims");
            None
        }
    }
}
