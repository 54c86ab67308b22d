pub mod document;
pub mod user;

pub use document::{DocumentId, DocumentKind, DocumentPage, DocumentRecord};
pub use user::{Identity, LoginRequest, Role, Session, SessionStatus, SignupRequest, UserSummary};
