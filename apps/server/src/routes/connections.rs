use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use shared_proto::pagination::Paginated;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extractors::{IdPath, Pagination};
use crate::graph::{self, Resolution};
use crate::models::{Connection, ConnectionView, UserPublic};
use crate::state::AppState;
use crate::store::SocialStore;

use super::paginated;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/:id/connect", post(send_request))
        .route("/connections", get(list_connections))
        .route("/connections/incoming", get(list_incoming))
        .route("/connections/:id/accept", post(accept_request))
        .route("/connections/:id/decline", post(decline_request))
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub message: String,
    pub connection: ConnectionView,
}

async fn public_user(store: &dyn SocialStore, id: uuid::Uuid) -> ApiResult<UserPublic> {
    store
        .find_user(id)
        .await?
        .map(UserPublic::from)
        .ok_or_else(|| ApiError::not_found("User"))
}

async fn connection_view(store: &dyn SocialStore, connection: Connection) -> ApiResult<ConnectionView> {
    let sender = public_user(store, connection.sender_id).await?;
    let receiver = public_user(store, connection.receiver_id).await?;
    Ok(ConnectionView::new(connection, sender, receiver))
}

/// Send a connection request
async fn send_request(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(receiver_id): IdPath,
) -> ApiResult<(StatusCode, Json<ConnectionResponse>)> {
    let store = state.store();
    let connection = graph::request(store, user.id, receiver_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ConnectionResponse {
            message: "Connection request sent successfully".to_string(),
            connection: connection_view(store, connection).await?,
        }),
    ))
}

/// Users connected to the requester
async fn list_connections(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<UserPublic>>> {
    Ok(Json(graph::list_accepted(state.store(), user.id).await?))
}

/// Pending requests addressed to the requester, oldest first
async fn list_incoming(
    State(state): State<AppState>,
    user: AuthUser,
    Pagination(query): Pagination,
) -> ApiResult<Json<Paginated<ConnectionView>>> {
    let store = state.store();
    let (connections, count) = store.list_incoming(user.id, &query).await?;

    let mut views = Vec::with_capacity(connections.len());
    for connection in connections {
        views.push(connection_view(store, connection).await?);
    }
    Ok(Json(paginated(&query, count, views)?))
}

async fn resolve(
    state: &AppState,
    user: &AuthUser,
    connection_id: uuid::Uuid,
    resolution: Resolution,
) -> ApiResult<Json<ConnectionResponse>> {
    let store = state.store();
    let connection = graph::resolve(store, user.id, connection_id, resolution).await?;

    Ok(Json(ConnectionResponse {
        message: format!("Connection {} successfully", resolution.past_tense()),
        connection: connection_view(store, connection).await?,
    }))
}

async fn accept_request(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(connection_id): IdPath,
) -> ApiResult<Json<ConnectionResponse>> {
    resolve(&state, &user, connection_id, Resolution::Accept).await
}

async fn decline_request(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(connection_id): IdPath,
) -> ApiResult<Json<ConnectionResponse>> {
    resolve(&state, &user, connection_id, Resolution::Decline).await
}
