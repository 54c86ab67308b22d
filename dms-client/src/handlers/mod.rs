pub mod admin;
pub mod auth;
pub mod documents;
pub mod notify;

pub use notify::{Notification, Notify, Severity};
