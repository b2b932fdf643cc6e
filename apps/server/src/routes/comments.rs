use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::{Validate, ValidationErrors};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiJson, IdPath};
use crate::models::{Comment, CommentView};
use crate::routes::posts::CommentRequest;
use crate::state::AppState;
use crate::store::SocialStore;
use crate::validation::validate_comment_content;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/comments/:id",
            get(get_comment).patch(update_comment).delete(delete_comment),
        )
        .route("/comments/:id/reply", post(reply_to_comment))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: Option<String>,
}

impl UpdateCommentRequest {
    fn validated(self) -> ApiResult<Option<String>> {
        if let Some(content) = &self.content {
            if let Err(e) = validate_comment_content(content) {
                let mut errors = ValidationErrors::new();
                errors.add("content", e);
                return Err(errors.into());
            }
        }
        Ok(self.content)
    }
}

async fn require_comment(store: &dyn SocialStore, comment_id: uuid::Uuid) -> ApiResult<Comment> {
    store
        .find_comment(comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))
}

fn ensure_author(comment: &Comment, user: &AuthUser) -> ApiResult<()> {
    if comment.author_id != user.id {
        return Err(ApiError::Forbidden(
            "You can only modify your own comments".to_string(),
        ));
    }
    Ok(())
}

async fn view(store: &dyn SocialStore, comment_id: uuid::Uuid) -> ApiResult<CommentView> {
    store
        .comment_view(comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))
}

async fn get_comment(
    State(state): State<AppState>,
    _user: AuthUser,
    IdPath(comment_id): IdPath,
) -> ApiResult<Json<CommentView>> {
    Ok(Json(view(state.store(), comment_id).await?))
}

async fn update_comment(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(comment_id): IdPath,
    ApiJson(req): ApiJson<UpdateCommentRequest>,
) -> ApiResult<Json<CommentView>> {
    let store = state.store();
    let comment = require_comment(store, comment_id).await?;
    ensure_author(&comment, &user)?;

    if let Some(content) = req.validated()? {
        store
            .update_comment(comment_id, content)
            .await?
            .ok_or_else(|| ApiError::not_found("Comment"))?;
        tracing::info!(component = "comments", comment_id = %comment_id, "comment updated");
    }

    Ok(Json(view(store, comment_id).await?))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(comment_id): IdPath,
) -> ApiResult<StatusCode> {
    let store = state.store();
    let comment = require_comment(store, comment_id).await?;
    ensure_author(&comment, &user)?;

    let removed = store.delete_comment_tree(comment_id).await?;
    tracing::info!(component = "comments", comment_id = %comment_id, removed, "comment thread deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn reply_to_comment(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(parent_id): IdPath,
    ApiJson(req): ApiJson<CommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentView>)> {
    req.validate()?;
    let store = state.store();
    let parent = require_comment(store, parent_id).await?;

    let reply = Comment::new(parent.post_id, user.id, Some(parent.id), req.content);
    store.insert_comment(&reply).await?;
    tracing::info!(
        component = "comments",
        comment_id = %reply.id,
        parent_id = %parent.id,
        "reply created"
    );

    Ok((StatusCode::CREATED, Json(view(store, reply.id).await?)))
}
