use crate::handlers::notify::{report, Notification};
use crate::middleware::{GuardDecision, Route};
use crate::models::Identity;
use crate::AppState;
use anyhow::bail;

pub async fn login(state: &AppState, email: &str, password: &str) -> anyhow::Result<()> {
    let session = state.session.login(email, password).await.map_err(report)?;
    if let Some(identity) = session.identity() {
        println!(
            "{}",
            Notification::success("Signed in", format!("Welcome back, {}", identity.name()))
        );
    }
    Ok(())
}

pub async fn signup(
    state: &AppState,
    email: &str,
    fullname: &str,
    password: &str,
) -> anyhow::Result<()> {
    let message = state
        .session
        .signup(email, fullname, password)
        .await
        .map_err(report)?;
    println!("{}", Notification::success("Account created", message));
    Ok(())
}

pub async fn logout(state: &AppState) -> anyhow::Result<()> {
    state.session.logout().await;
    println!("{}", Notification::success("Signed out", "Local session cleared."));
    Ok(())
}

pub async fn whoami(state: &AppState) -> anyhow::Result<()> {
    let session = state.session.current();
    match session.identity() {
        Some(identity) => {
            println!("{} ({})", identity.email, identity.initials());
            println!("role: {:?}", identity.role);
            if let Some(expires_at) = session.expires_at() {
                println!("token expires: {}", expires_at.format("%Y-%m-%d %H:%M UTC"));
            }
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

pub async fn route(state: &AppState, path: &str) -> anyhow::Result<()> {
    let Some(route) = Route::from_path(path) else {
        bail!("Unknown route {}", path);
    };
    match state.guard.check_when_ready(route).await {
        GuardDecision::Render => println!("{} -> render", route),
        GuardDecision::Loading => println!("{} -> loading", route),
        GuardDecision::Redirect(target) => println!("{} -> redirect {}", route, target),
    }
    Ok(())
}

/// Runs the route guard for `route` and returns the signed-in identity when
/// it lets the visitor through.
pub async fn require(state: &AppState, route: Route) -> anyhow::Result<Identity> {
    match state.guard.check_when_ready(route).await {
        GuardDecision::Render => match state.session.current().identity() {
            Some(identity) => Ok(identity.clone()),
            None => bail!("Not signed in. Run `dms-client login` first."),
        },
        GuardDecision::Redirect(Route::SignIn) => {
            bail!("Not signed in. Run `dms-client login` first.")
        }
        GuardDecision::Redirect(_) => bail!("Administrator access required"),
        GuardDecision::Loading => bail!("Session is still loading"),
    }
}
