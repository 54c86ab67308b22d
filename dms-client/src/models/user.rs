use chrono::{DateTime, Utc};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "ADMIN")]
    Admin,
    #[serde(alias = "USER")]
    User,
}

/// Who is signed in. Persisted under the `user` cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn name(&self) -> String {
        self.email.split('@').next().unwrap_or("User").to_string()
    }

    pub fn initials(&self) -> String {
        let name = self.name();
        let initials: String = name.chars().take(2).collect();
        if initials.is_empty() {
            "U".to_string()
        } else {
            initials.to_uppercase()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// Snapshot of the session. The credential is present exactly when the
/// status is `Authenticated`; the constructors are the only way to build one.
#[derive(Debug, Clone)]
pub struct Session {
    status: SessionStatus,
    identity: Option<Identity>,
    credential: Option<Secret<String>>,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn signed_out() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            identity: None,
            credential: None,
            expires_at: None,
        }
    }

    pub fn authenticating() -> Self {
        Self {
            status: SessionStatus::Authenticating,
            ..Self::signed_out()
        }
    }

    pub fn authenticated(
        identity: Identity,
        credential: Secret<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            identity: Some(identity),
            credential: Some(credential),
            expires_at,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn credential(&self) -> Option<&Secret<String>> {
        self.credential.as_ref()
    }

    /// Token expiry read from its claims, when the token carries one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub fn is_admin(&self) -> bool {
        self.identity.as_ref().is_some_and(Identity::is_admin)
    }
}

/// Result row of the admin user search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub fullname: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Full name is required"))]
    pub fullname: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponseWire {
    pub access_token: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserSummaryWire {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub fullname: Option<String>,
    pub role: Role,
}

impl From<UserSummaryWire> for UserSummary {
    fn from(wire: UserSummaryWire) -> Self {
        Self {
            id: wire.id,
            fullname: wire.fullname.unwrap_or_default(),
            email: wire.email,
            role: wire.role,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageWire {
    pub message: String,
}
