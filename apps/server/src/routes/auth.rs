use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::auth::{self, AuthResponse, AuthUser, LoginRequest, RegisterRequest};
use crate::error::ApiResult;
use crate::extractors::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/logoutall", post(logout_all))
}

async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let response = auth::register(state.store(), &state.tokens, req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let response = auth::login(state.store(), &state.tokens, req).await?;
    Ok(Json(response))
}

async fn logout(State(state): State<AppState>, user: AuthUser) -> ApiResult<StatusCode> {
    auth::logout(state.store(), &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn logout_all(State(state): State<AppState>, user: AuthUser) -> ApiResult<StatusCode> {
    auth::logout_all(state.store(), &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
