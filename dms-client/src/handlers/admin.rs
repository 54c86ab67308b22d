use crate::handlers::auth::require;
use crate::handlers::documents::{load_all, render};
use crate::handlers::notify::report;
use crate::middleware::Route;
use crate::services::{DocumentFilter, ViewId};
use crate::AppState;
use anyhow::bail;

pub async fn search(state: &AppState, query: &str) -> anyhow::Result<()> {
    require(state, Route::Admin).await?;
    let users = state.admin.search_users(query).await.map_err(report)?;

    if users.is_empty() {
        println!("No users found");
        return Ok(());
    }
    println!("{:>6}  {:<32}  {:<24}  {}", "ID", "EMAIL", "NAME", "ROLE");
    for user in users {
        println!(
            "{:>6}  {:<32}  {:<24}  {:?}",
            user.id, user.email, user.fullname, user.role
        );
    }
    Ok(())
}

pub async fn recent(state: &AppState, limit: u32) -> anyhow::Result<()> {
    require(state, Route::Admin).await?;
    let page = state.admin.recent_uploads(limit).await.map_err(report)?;

    if page.items.is_empty() {
        println!("No uploads yet");
        return Ok(());
    }
    for d in page.items {
        println!(
            "{:>6}  {:<40}  {}  {}",
            d.id,
            d.filename,
            d.created_at.format("%Y-%m-%d %H:%M"),
            d.owner_email
        );
    }
    Ok(())
}

/// Opens another user's documents in their own view, as the admin dialog does.
pub async fn view_as(state: &AppState, email: &str, all: bool) -> anyhow::Result<()> {
    require(state, Route::Admin).await?;

    let users = state.admin.search_users(email).await.map_err(report)?;
    let Some(user) = users
        .into_iter()
        .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
    else {
        bail!("No user with email {}", email);
    };

    let view = ViewId::UserDialog(user.id);
    let result = async {
        state
            .documents
            .select_scope(view, &user.email)
            .await
            .map_err(report)?;
        if all {
            load_all(&state.documents, view).await?;
        }
        println!("Documents of {} <{}>", user.fullname, user.email);
        render(&state.documents.snapshot(view), &DocumentFilter::default());
        Ok::<(), anyhow::Error>(())
    }
    .await;

    state.documents.close_view(view);
    result
}
