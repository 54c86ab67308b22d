use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

/// Claims the dashboard reads from an access token.
#[derive(Debug, Deserialize)]
pub struct JwtClaims {
    /// The API puts the account email here.
    pub sub: Option<String>,
    pub exp: Option<i64>,
}

/// Decode JWT claims without validation.
///
/// The token is opaque to this client; the API verifies it on every request.
/// Claims are only read to display the expiry and to sanity-check the subject.
pub fn decode_jwt_claims(token: &str) -> Result<JwtClaims> {
    let parts: Vec<&str> = token.split('.').collect();

    if parts.len() != 3 {
        return Err(anyhow::anyhow!("Invalid JWT format"));
    }

    let payload = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| anyhow::anyhow!("Failed to decode JWT payload: {}", e))?;

    let claims: JwtClaims = serde_json::from_slice(&payload)
        .map_err(|e| anyhow::anyhow!("Failed to parse JWT claims: {}", e))?;

    Ok(claims)
}
