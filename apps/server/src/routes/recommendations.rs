use axum::{extract::State, routing::get, Json, Router};
use shared_proto::pagination::Paginated;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extractors::Pagination;
use crate::models::Recommendation;
use crate::state::AppState;

use super::paginated;

pub fn router() -> Router<AppState> {
    Router::new().route("/recommendations", get(list_recommendations))
}

/// People the requester may know, most mutual connections first
async fn list_recommendations(
    State(state): State<AppState>,
    user: AuthUser,
    Pagination(query): Pagination,
) -> ApiResult<Json<Paginated<Recommendation>>> {
    let ranked = state.store().recommendations(user.id).await?;
    let count = ranked.len() as u64;
    let page: Vec<Recommendation> = ranked
        .into_iter()
        .skip(query.offset() as usize)
        .take(query.page_size() as usize)
        .collect();

    tracing::debug!(component = "recommendations", user_id = %user.id, count, "recommendations ranked");
    Ok(Json(paginated(&query, count, page)?))
}
