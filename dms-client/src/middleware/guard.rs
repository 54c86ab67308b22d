//! Route gating on top of the session store.

use crate::models::{Session, SessionStatus};
use crate::services::session::SessionCell;
use std::fmt;
use std::sync::Arc;

/// Authorization a route demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    None,
    /// Only for visitors who are not signed in (sign-in, sign-up).
    Guest,
    Authenticated,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    SignIn,
    SignUp,
    Dashboard,
    Documents,
    Admin,
}

impl Route {
    pub const ALL: [Route; 6] = [
        Route::Home,
        Route::SignIn,
        Route::SignUp,
        Route::Dashboard,
        Route::Documents,
        Route::Admin,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::SignIn => "/login",
            Route::SignUp => "/signup",
            Route::Dashboard => "/dashboard",
            Route::Documents => "/documents",
            Route::Admin => "/admin",
        }
    }

    pub fn requirement(&self) -> Requirement {
        match self {
            Route::Home => Requirement::None,
            Route::SignIn | Route::SignUp => Requirement::Guest,
            Route::Dashboard | Route::Documents => Requirement::Authenticated,
            Route::Admin => Requirement::Admin,
        }
    }

    pub fn from_path(path: &str) -> Option<Route> {
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { "/" } else { trimmed };
        Self::ALL.into_iter().find(|r| r.path() == path)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// The session has not been restored, or a protected route is waiting
    /// on a sign-in in progress.
    Loading,
    Redirect(Route),
}

/// Pure decision for `requirement` against `session`.
pub fn decide(requirement: Requirement, session: &Session, restored: bool) -> GuardDecision {
    if requirement == Requirement::None {
        return GuardDecision::Render;
    }
    if !restored {
        return GuardDecision::Loading;
    }

    match (requirement, session.is_authenticated()) {
        (Requirement::Guest, false) => GuardDecision::Render,
        (Requirement::Guest, true) => GuardDecision::Redirect(Route::Dashboard),
        (_, false) if session.status() == SessionStatus::Authenticating => GuardDecision::Loading,
        (_, false) => GuardDecision::Redirect(Route::SignIn),
        (Requirement::Admin, true) if !session.is_admin() => {
            GuardDecision::Redirect(Route::Dashboard)
        }
        _ => GuardDecision::Render,
    }
}

#[derive(Clone)]
pub struct RouteGuard {
    session: Arc<SessionCell>,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionCell>) -> Self {
        Self { session }
    }

    pub fn check(&self, route: Route) -> GuardDecision {
        let decision = decide(
            route.requirement(),
            &self.session.current(),
            self.session.is_restored(),
        );
        if let GuardDecision::Redirect(target) = decision {
            tracing::debug!(from = %route, to = %target, "Redirecting");
        }
        decision
    }

    /// Waits for the initial restore, then decides. Never returns `Loading`
    /// unless a sign-in is still in progress.
    pub async fn check_when_ready(&self, route: Route) -> GuardDecision {
        let mut restored = self.session.watch_restored();
        if restored.wait_for(|done| *done).await.is_err() {
            tracing::warn!("Session store dropped before restore finished");
        }
        self.check(route)
    }
}
