use axum::{routing::get, Json, Router};
use shared_proto::pagination::{PageQuery, Paginated};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub mod auth;
pub mod comments;
pub mod connections;
pub mod posts;
pub mod profile;
pub mod recommendations;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/", get(api_index))
        .merge(auth::router())
        .merge(profile::router())
        .merge(users::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(connections::router())
        .merge(recommendations::router())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn api_index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the Social Media API",
        "endpoints": {
            "authentication": {
                "register": "/api/register",
                "login": "/api/login",
                "logout": "/api/logout",
                "logoutall": "/api/logoutall",
            },
            "profile": "/api/profile",
            "users": {
                "detail": "/api/users/{user_id}",
            },
            "posts": {
                "list_create": "/api/posts",
                "detail": "/api/posts/{post_id}",
                "like": "/api/posts/{post_id}/like",
                "unlike": "/api/posts/{post_id}/unlike",
                "comments": "/api/posts/{post_id}/comments",
            },
            "comments": {
                "detail": "/api/comments/{comment_id}",
                "reply": "/api/comments/{comment_id}/reply",
            },
            "connections": {
                "list": "/api/connections",
                "connect": "/api/users/{user_id}/connect",
                "incoming": "/api/connections/incoming",
                "accept": "/api/connections/{connection_id}/accept",
                "decline": "/api/connections/{connection_id}/decline",
            },
            "recommendations": "/api/recommendations",
        }
    }))
}

/// Wraps one page of results, rejecting pages past the end.
pub(crate) fn paginated<T>(query: &PageQuery, count: u64, results: Vec<T>) -> ApiResult<Paginated<T>> {
    let page = Paginated::new(query, count, results);
    if page.is_out_of_range(query) {
        return Err(ApiError::NotFound("Invalid page.".to_string()));
    }
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::test_support::TestApp;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn index_and_health_need_no_token() {
        let app = TestApp::new();

        let (status, body) = app.get("/api", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoints"]["recommendations"], "/api/recommendations");

        let (status, _) = app.get("/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let app = TestApp::new();
        for uri in ["/api/profile", "/api/posts", "/api/recommendations", "/api/connections/incoming"] {
            let (status, _) = app.get(uri, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }

        let (status, _) = app.get("/api/posts", Some("not-a-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn pages_past_the_end_are_not_found() {
        let app = TestApp::new();
        let alice = app.register("alice").await;

        let (status, body) = app.get("/api/posts?page=2", Some(&alice.token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Invalid page.");

        let (status, body) = app.get("/api/posts", Some(&alice.token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }
}
