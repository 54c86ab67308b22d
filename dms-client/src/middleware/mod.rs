pub mod guard;

pub use guard::{GuardDecision, Requirement, Route, RouteGuard};
