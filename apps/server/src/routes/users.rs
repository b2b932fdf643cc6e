use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extractors::IdPath;
use crate::graph;
use crate::models::{ProfileView, UserPublic};
use crate::routes::profile::profile_view;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/users/:id", get(get_user))
}

/// Another user's public page as seen by the requester.
#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: UserPublic,
    pub profile: ProfileView,
    pub is_connected: bool,
}

async fn get_user(
    State(state): State<AppState>,
    viewer: AuthUser,
    IdPath(user_id): IdPath,
) -> ApiResult<Json<UserDetail>> {
    let store = state.store();
    let profile = profile_view(store, user_id).await?;
    let is_connected = graph::are_connected(store, viewer.id, user_id).await?;

    Ok(Json(UserDetail {
        user: profile.user.clone(),
        profile,
        is_connected,
    }))
}
