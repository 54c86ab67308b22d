//! Test helpers for dms-client integration tests.
//!
//! Spawns an in-process fake of the document API on a random local port and
//! builds client state pointed at it.

#![allow(dead_code)]

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use dms_client::config::ApiSettings;
use dms_client::services::{DurableCache, MemoryCache};
use dms_client::utils::UploadPolicy;
use dms_client::AppState;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::time::Duration;
use tokio::net::TcpListener;

pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@example.com";
pub const ADMIN: &str = "admin@example.com";
pub const PASSWORD: &str = "secret123";

static TRACING: Once = Once::new();

/// Installs a test-friendly subscriber once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

struct FakeUser {
    id: i64,
    email: String,
    fullname: String,
    password: String,
    role: String,
}

struct StoredDoc {
    id: i64,
    owner: String,
    filename: String,
    document_type: String,
    uploaded_by: String,
    content_type: String,
    created_at: DateTime<Utc>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct Backend {
    users: Vec<FakeUser>,
    docs: Vec<StoredDoc>,
    next_user_id: i64,
    next_doc_id: i64,
    tokens: HashMap<String, String>,
    token_seq: u64,
    list_delays: HashMap<String, Duration>,
    login_delay: Option<Duration>,
    mutation_delay: Option<Duration>,
    fail_deletes: bool,
    fail_lists: HashSet<String>,
    hits: HashMap<&'static str, usize>,
    per_page_seen: Vec<Option<u32>>,
}

impl Backend {
    fn hit(&mut self, route: &'static str) {
        *self.hits.entry(route).or_default() += 1;
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<String, Response> {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(|token| self.tokens.get(token).cloned())
            .ok_or_else(|| detail(StatusCode::UNAUTHORIZED, "Could not validate credentials"))
    }

    fn authorize_admin(&self, headers: &HeaderMap) -> Result<String, Response> {
        let email = self.authorize(headers)?;
        let is_admin = self
            .users
            .iter()
            .any(|u| u.email == email && u.role == "admin");
        if is_admin {
            Ok(email)
        } else {
            Err(detail(StatusCode::FORBIDDEN, "Not enough permissions"))
        }
    }

    fn issue_token(&mut self, email: &str) -> String {
        self.token_seq += 1;
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = json!({
            "sub": email,
            "exp": Utc::now().timestamp() + 3600,
            "jti": self.token_seq,
        });
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let token = format!("{}.{}.signature", header, payload);
        self.tokens.insert(token.clone(), email.to_string());
        token
    }

    fn insert_doc(
        &mut self,
        owner: &str,
        filename: &str,
        document_type: &str,
        uploaded_by: &str,
        created_at: DateTime<Utc>,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> i64 {
        self.next_doc_id += 1;
        let id = self.next_doc_id;
        self.docs.push(StoredDoc {
            id,
            owner: owner.to_string(),
            filename: filename.to_string(),
            document_type: document_type.to_string(),
            uploaded_by: uploaded_by.to_string(),
            content_type: content_type.to_string(),
            created_at,
            bytes,
        });
        id
    }

    fn fullname(&self, email: &str) -> String {
        self.users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.fullname.clone())
            .unwrap_or_default()
    }
}

type Shared = Arc<Mutex<Backend>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Backend> {
    shared.lock().unwrap()
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn doc_json(doc: &StoredDoc) -> Value {
    json!({
        "id": doc.id,
        "filename": doc.filename,
        "document_type": doc.document_type,
        "email": doc.owner,
        "uploaded_by": doc.uploaded_by,
        // The API emits naive UTC timestamps.
        "created_at": doc.created_at.naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    })
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct SignupBody {
    email: String,
    fullname: String,
    password: String,
}

#[derive(Deserialize)]
struct ListQuery {
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

async fn login(State(shared): State<Shared>, Json(body): Json<Credentials>) -> Response {
    let delay = {
        let mut backend = lock(&shared);
        backend.hit("login");
        backend.login_delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut backend = lock(&shared);
    let role = backend
        .users
        .iter()
        .find(|u| u.email == body.email && u.password == body.password)
        .map(|u| u.role.clone());
    match role {
        Some(role) => {
            let token = backend.issue_token(&body.email);
            Json(json!({ "access_token": token, "token_type": "bearer", "role": role }))
                .into_response()
        }
        None => detail(StatusCode::UNAUTHORIZED, "Incorrect email or password"),
    }
}

async fn signup(State(shared): State<Shared>, Json(body): Json<SignupBody>) -> Response {
    let mut backend = lock(&shared);
    backend.hit("signup");
    if backend.users.iter().any(|u| u.email == body.email) {
        return detail(StatusCode::BAD_REQUEST, "Email already registered");
    }
    backend.next_user_id += 1;
    let id = backend.next_user_id;
    backend.users.push(FakeUser {
        id,
        email: body.email,
        fullname: body.fullname,
        password: body.password,
        role: "user".to_string(),
    });
    Json(json!({ "message": "User created successfully" })).into_response()
}

async fn list_documents(
    State(shared): State<Shared>,
    Path(email): Path<String>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Response {
    let delay = {
        let mut backend = lock(&shared);
        backend.hit("list");
        backend.per_page_seen.push(query.per_page);
        backend.list_delays.get(&email).copied()
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    // Checked after the delay so a token revoked meanwhile is rejected.
    let backend = lock(&shared);
    if let Err(response) = backend.authorize(&headers) {
        return response;
    }
    if backend.fail_lists.contains(&email) {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "Error retrieving documents");
    }

    let mut docs: Vec<&StoredDoc> = backend.docs.iter().filter(|d| d.owner == email).collect();
    docs.sort_by(|a, b| b.id.cmp(&a.id));

    let per_page = query.per_page.unwrap_or(5).max(1) as usize;
    let page = query.page.unwrap_or(1).max(1) as usize;
    let total = docs.len();
    let total_pages = total.div_ceil(per_page);
    let items: Vec<Value> = docs
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .map(doc_json)
        .collect();

    Json(json!({
        "documents": items,
        "total": total,
        "page": page,
        "per_page": per_page,
        "total_pages": total_pages,
    }))
    .into_response()
}

async fn upload(
    State(shared): State<Shared>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let (caller, delay) = {
        let mut backend = lock(&shared);
        backend.hit("upload");
        match backend.authorize(&headers) {
            Ok(caller) => (caller, backend.mutation_delay),
            Err(response) => return response,
        }
    };

    let mut file: Option<(Vec<u8>, String)> = None;
    let mut metadata: Option<Value> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
                file = Some((bytes, content_type));
            }
            Some("document") => {
                let text = field.text().await.unwrap_or_default();
                metadata = serde_json::from_str(&text).ok();
            }
            _ => {}
        }
    }

    let (Some((bytes, content_type)), Some(metadata)) = (file, metadata) else {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, "file and document are required");
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let field = |key: &str| metadata[key].as_str().unwrap_or_default().to_string();
    let mut backend = lock(&shared);
    let id = backend.insert_doc(
        &field("email"),
        &field("filename"),
        &field("document_type"),
        &caller,
        Utc::now(),
        bytes,
        &content_type,
    );
    let doc = backend.docs.iter().find(|d| d.id == id).map(doc_json);
    Json(doc.unwrap_or(Value::Null)).into_response()
}

async fn delete_document(
    State(shared): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let delay = {
        let mut backend = lock(&shared);
        backend.hit("delete");
        if let Err(response) = backend.authorize(&headers) {
            return response;
        }
        backend.mutation_delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut backend = lock(&shared);
    if backend.fail_deletes {
        return detail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete document");
    }
    match backend.docs.iter().position(|d| d.id == id) {
        Some(index) => {
            backend.docs.remove(index);
            Json(json!({ "message": "Document deleted successfully" })).into_response()
        }
        None => detail(StatusCode::NOT_FOUND, "Document not found"),
    }
}

async fn download(
    State(shared): State<Shared>,
    Path((email, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let delay = {
        let mut backend = lock(&shared);
        backend.hit("download");
        if let Err(response) = backend.authorize(&headers) {
            return response;
        }
        backend.mutation_delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let backend = lock(&shared);
    match backend
        .docs
        .iter()
        .find(|d| d.owner == email && d.filename == filename)
    {
        Some(doc) => (
            [(header::CONTENT_TYPE, doc.content_type.clone())],
            doc.bytes.clone(),
        )
            .into_response(),
        None => detail(StatusCode::NOT_FOUND, "File not found"),
    }
}

async fn preview(
    State(shared): State<Shared>,
    Path((email, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut backend = lock(&shared);
    backend.hit("preview");
    if let Err(response) = backend.authorize(&headers) {
        return response;
    }
    match backend
        .docs
        .iter()
        .find(|d| d.owner == email && d.filename == filename)
    {
        Some(doc) => Json(json!({
            "preview_url": format!("https://drive.example.com/file/{}/preview", doc.id)
        }))
        .into_response(),
        None => detail(StatusCode::NOT_FOUND, "File not found"),
    }
}

async fn search_users(
    State(shared): State<Shared>,
    Path(query): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut backend = lock(&shared);
    backend.hit("search");
    if let Err(response) = backend.authorize_admin(&headers) {
        return response;
    }
    let needle = query.to_lowercase();
    let users: Vec<Value> = backend
        .users
        .iter()
        .filter(|u| {
            u.email.to_lowercase().contains(&needle) || u.fullname.to_lowercase().contains(&needle)
        })
        .map(|u| json!({ "id": u.id, "email": u.email, "fullname": u.fullname, "role": u.role }))
        .collect();
    Json(users).into_response()
}

async fn recent_uploads(
    State(shared): State<Shared>,
    Query(query): Query<RecentQuery>,
    headers: HeaderMap,
) -> Response {
    let mut backend = lock(&shared);
    backend.hit("recent");
    if let Err(response) = backend.authorize_admin(&headers) {
        return response;
    }
    let mut docs: Vec<&StoredDoc> = backend.docs.iter().collect();
    docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    let uploads: Vec<Value> = docs
        .into_iter()
        .take(query.limit.unwrap_or(10))
        .map(|d| {
            json!({
                "id": d.id,
                "filename": d.filename,
                "document_type": d.document_type,
                "created_at": d.created_at.to_rfc3339(),
                "user": { "email": d.owner, "fullname": backend.fullname(&d.owner) },
            })
        })
        .collect();
    Json(uploads).into_response()
}

/// In-process fake of the document API.
pub struct FakeApi {
    pub base_url: String,
    backend: Shared,
}

impl FakeApi {
    /// Spawns the fake on a random port with three accounts: two users and
    /// one admin, all using [`PASSWORD`].
    pub async fn spawn() -> Self {
        init_tracing();

        let backend: Shared = Arc::new(Mutex::new(Backend::default()));
        let router = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/signup", post(signup))
            .route("/api/documents/documents/:email", get(list_documents))
            .route("/api/documents/upload", post(upload))
            .route("/api/documents/delete/:id", delete(delete_document))
            .route("/api/documents/download/:email/:filename", get(download))
            .route("/api/documents/preview/:email/:filename", get(preview))
            .route("/api/documents/users/search/:query", get(search_users))
            .route("/api/documents/recent-uploads", get(recent_uploads))
            .with_state(backend.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let api = Self {
            base_url: format!("http://{}", addr),
            backend,
        };
        api.add_user(ALICE, "Alice Smith", "user");
        api.add_user(BOB, "Bob Johnson", "user");
        api.add_user(ADMIN, "Ada Admin", "admin");
        api
    }

    fn backend(&self) -> MutexGuard<'_, Backend> {
        lock(&self.backend)
    }

    pub fn add_user(&self, email: &str, fullname: &str, role: &str) -> i64 {
        let mut backend = self.backend();
        backend.next_user_id += 1;
        let id = backend.next_user_id;
        backend.users.push(FakeUser {
            id,
            email: email.to_string(),
            fullname: fullname.to_string(),
            password: PASSWORD.to_string(),
            role: role.to_string(),
        });
        id
    }

    pub fn user_id(&self, email: &str) -> i64 {
        self.backend()
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.id)
            .expect("unknown user")
    }

    /// Stores a document created `age` ago and returns its id.
    pub fn add_document(&self, owner: &str, filename: &str, age: chrono::Duration) -> i64 {
        self.backend().insert_doc(
            owner,
            filename,
            "application/pdf",
            owner,
            Utc::now() - age,
            format!("contents of {}", filename).into_bytes(),
            "application/pdf",
        )
    }

    /// Stores `count` documents for `owner`; later ones are newer.
    pub fn seed_documents(&self, owner: &str, count: usize) -> Vec<i64> {
        (0..count)
            .map(|i| {
                let age = chrono::Duration::hours((count - i) as i64);
                self.add_document(owner, &format!("{}-doc-{}.pdf", owner_tag(owner), i), age)
            })
            .collect()
    }

    pub fn set_list_delay(&self, owner: &str, delay: Duration) {
        self.backend().list_delays.insert(owner.to_string(), delay);
    }

    pub fn clear_list_delay(&self, owner: &str) {
        self.backend().list_delays.remove(owner);
    }

    pub fn set_login_delay(&self, delay: Option<Duration>) {
        self.backend().login_delay = delay;
    }

    pub fn set_mutation_delay(&self, delay: Option<Duration>) {
        self.backend().mutation_delay = delay;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.backend().fail_deletes = fail;
    }

    pub fn fail_lists_for(&self, owner: &str, fail: bool) {
        let mut backend = self.backend();
        if fail {
            backend.fail_lists.insert(owner.to_string());
        } else {
            backend.fail_lists.remove(owner);
        }
    }

    /// Invalidates every issued token, as a server-side revocation would.
    pub fn revoke_tokens(&self) {
        self.backend().tokens.clear();
    }

    pub fn hits(&self, route: &'static str) -> usize {
        self.backend().hits.get(route).copied().unwrap_or(0)
    }

    pub fn per_page_seen(&self) -> Vec<Option<u32>> {
        self.backend().per_page_seen.clone()
    }

    pub fn document_ids(&self, owner: &str) -> Vec<i64> {
        self.backend()
            .docs
            .iter()
            .filter(|d| d.owner == owner)
            .map(|d| d.id)
            .collect()
    }

    pub fn stored_upload(&self, id: i64) -> Option<(String, String, Vec<u8>)> {
        self.backend()
            .docs
            .iter()
            .find(|d| d.id == id)
            .map(|d| (d.content_type.clone(), d.uploaded_by.clone(), d.bytes.clone()))
    }

    pub fn settings(&self) -> ApiSettings {
        ApiSettings::new(self.base_url.clone())
    }

    /// Client state backed by a fresh in-memory cache.
    pub fn client(&self) -> TestClient {
        let cache = Arc::new(MemoryCache::new());
        let state = self.client_with_cache(cache.clone());
        TestClient { state, cache }
    }

    pub fn client_with_cache(&self, cache: Arc<dyn DurableCache>) -> AppState {
        AppState::build(self.settings(), cache, UploadPolicy::default())
            .expect("Failed to build client state")
    }

    /// Client state with `email` signed in.
    pub async fn signed_in(&self, email: &str) -> TestClient {
        let client = self.client();
        client.state.restore().await;
        client
            .state
            .session
            .login(email, PASSWORD)
            .await
            .expect("Failed to sign in");
        client
    }
}

fn owner_tag(owner: &str) -> &str {
    owner.split('@').next().unwrap_or(owner)
}

pub struct TestClient {
    pub state: AppState,
    pub cache: Arc<MemoryCache>,
}

/// Waits for `condition` with a deadline, polling the client state.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
