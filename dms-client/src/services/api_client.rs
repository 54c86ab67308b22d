//! Single chokepoint for requests to the document API.
//!
//! Attaches the session credential, tags every request with a request id and
//! applies the global 401 policy: a rejected credential signs the session out
//! (clearing the durable cache) before the error reaches the caller.

use crate::config::ApiSettings;
use crate::error::ApiError;
use crate::observability::inject_trace_headers;
use crate::services::session::SessionCell;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct ApiClient {
    client: Client,
    base_url: Url,
    settings: ApiSettings,
    session: Arc<SessionCell>,
}

/// Raw response body with the headers a save needs.
#[derive(Debug, Clone)]
pub struct RawBody {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub bytes: Vec<u8>,
}

impl RawBody {
    /// The plain `filename=` parameter of `Content-Disposition`, if any.
    pub fn attachment_name(&self) -> Option<String> {
        self.content_disposition
            .as_deref()?
            .split(';')
            .map(str::trim)
            .find_map(|param| param.strip_prefix("filename="))
            .map(|value| value.trim_matches('"').to_string())
            .filter(|value| !value.is_empty())
    }
}

impl ApiClient {
    pub fn new(settings: ApiSettings, session: Arc<SessionCell>) -> Result<Self, ApiError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", settings.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(settings.base_url.clone()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            settings,
            session,
        })
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// Builds `{base}/api/{segments...}`, percent-encoding each segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.settings.base_url.clone()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    /// POST without credentials (sign-in, sign-up). A 401 here is an ordinary
    /// failure and does not touch the session.
    pub async fn post_public<B, T>(&self, segments: &[&str], body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let response = self.send(self.client.post(url).json(body), false).await?;
        decode_json(response).await
    }

    pub async fn get_json<T>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let response = self.send(self.client.get(url).query(query), true).await?;
        decode_json(response).await
    }

    pub async fn post_multipart<T>(
        &self,
        segments: &[&str],
        form: reqwest::multipart::Form,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let response = self.send(self.client.post(url).multipart(form), true).await?;
        decode_json(response).await
    }

    pub async fn delete(&self, segments: &[&str]) -> Result<(), ApiError> {
        let url = self.endpoint(segments)?;
        self.send(self.client.delete(url), true).await?;
        Ok(())
    }

    pub async fn get_bytes(&self, segments: &[&str]) -> Result<RawBody, ApiError> {
        let url = self.endpoint(segments)?;
        let response = self.send(self.client.get(url), true).await?;

        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let content_type = header(reqwest::header::CONTENT_TYPE);
        let content_disposition = header(reqwest::header::CONTENT_DISPOSITION);

        let bytes = response.bytes().await?.to_vec();
        Ok(RawBody {
            content_type,
            content_disposition,
            bytes,
        })
    }

    /// Best-effort POST to a configured absolute path under the base URL.
    /// Used for token revocation on sign-out.
    pub async fn post_authorized_path(&self, path: &str) -> Result<(), ApiError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))?;
        self.send(self.client.post(url), true).await?;
        Ok(())
    }

    async fn send(&self, builder: RequestBuilder, authorized: bool) -> Result<Response, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        let mut builder = builder.headers(inject_trace_headers(&request_id));

        // The epoch ties a 401 to the session that issued the request.
        let epoch = self.session.epoch();
        if authorized {
            if let Some(token) = self.session.credential() {
                builder = builder.bearer_auth(token.expose_secret());
            }
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "API request failed");
            ApiError::Transport(e)
        })?;

        let status = response.status();
        tracing::debug!(
            request_id = %request_id,
            url = %response.url(),
            status = %status,
            "API response"
        );

        if authorized && status == StatusCode::UNAUTHORIZED {
            tracing::warn!(request_id = %request_id, "Credential rejected; signing out");
            self.session.expire(epoch).await;
            // A newer session owns the cell: this was a stale request.
            if self.session.current().is_authenticated() {
                return Err(ApiError::Status {
                    status,
                    message: "Credential from a previous session was rejected".to_string(),
                });
            }
            return Err(ApiError::SessionExpired);
        }

        if !status.is_success() {
            let message = error_detail(response).await;
            tracing::warn!(
                request_id = %request_id,
                status = %status,
                message = %message,
                "API returned an error"
            );
            return Err(ApiError::Status { status, message });
        }

        Ok(response)
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Extracts the `detail` field of an error body, falling back to the raw text
/// or the status reason.
async fn error_detail(response: Response) -> String {
    let status = response.status();
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    };

    let Ok(text) = response.text().await else {
        return fallback();
    };

    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(serde_json::Value::Object(body)) => match body.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => fallback(),
        },
        _ if !text.trim().is_empty() => text.trim().to_string(),
        _ => fallback(),
    }
}
