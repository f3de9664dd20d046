//! Public menu handler (no authentication)

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    Json,
};

use crate::AppState;
use carta_core::{
    db::Repository,
    errors::Result,
    menu::{self, PublicMenu, ViewerMeta},
};

/// Fetch a restaurant's public menu by slug
pub async fn get_menu(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PublicMenu>> {
    let repo = Repository::new(state.db.clone());

    let viewer = ViewerMeta {
        user_agent: header_value(&headers, header::USER_AGENT.as_str()),
        remote_addr: forwarded_for(&headers),
    };

    let menu = menu::get_public_menu(&repo, &slug, viewer).await?;

    Ok(Json(menu))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

/// First hop of X-Forwarded-For, the closest thing to a client address
/// behind the usual reverse proxy
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
}
