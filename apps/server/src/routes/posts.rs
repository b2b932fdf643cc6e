use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared_proto::pagination::Paginated;
use shared_proto::social::MessageBody;
use std::collections::HashMap;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extractors::{nullable, ApiJson, IdPath, Pagination};
use crate::models::{Comment, CommentView, Post, PostChanges, PostSummary, PostView};
use crate::state::AppState;
use crate::store::SocialStore;
use crate::validation::{validate_comment_content, validate_image_ref, validate_post_content};

use super::paginated;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/:id",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/posts/:id/like", post(like_post))
        .route("/posts/:id/unlike", post(unlike_post))
        .route(
            "/posts/:id/comments",
            get(list_post_comments).post(create_post_comment),
        )
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(custom(function = "validate_post_content"))]
    pub content: String,
    #[validate(custom(function = "validate_image_ref"))]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub content: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Option<Option<String>>,
}

impl UpdatePostRequest {
    fn into_changes(self) -> ApiResult<PostChanges> {
        let mut errors = ValidationErrors::new();
        if let Some(content) = &self.content {
            if let Err(e) = validate_post_content(content) {
                errors.add("content", e);
            }
        }
        if let Some(Some(image)) = &self.image {
            if let Err(e) = validate_image_ref(image) {
                errors.add("image", e);
            }
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(PostChanges {
            content: self.content,
            image: self.image.map(|image| image.map(|i| i.trim().to_string())),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(custom(function = "validate_comment_content"))]
    pub content: String,
}

/// Attaches each post's comments, oldest first.
async fn post_views(store: &dyn SocialStore, summaries: Vec<PostSummary>) -> ApiResult<Vec<PostView>> {
    let ids: Vec<Uuid> = summaries.iter().map(|s| s.post.id).collect();
    let mut by_post: HashMap<Uuid, Vec<CommentView>> = HashMap::new();
    for comment in store.comments_for_posts(&ids).await? {
        by_post.entry(comment.post).or_default().push(comment);
    }

    Ok(summaries
        .into_iter()
        .map(|summary| {
            let comments = by_post.remove(&summary.post.id).unwrap_or_default();
            PostView::new(summary, comments)
        })
        .collect())
}

async fn post_view(store: &dyn SocialStore, viewer: Uuid, post_id: Uuid) -> ApiResult<PostView> {
    let summary = store
        .post_summary(viewer, post_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    let mut views = post_views(store, vec![summary]).await?;
    views
        .pop()
        .ok_or_else(|| ApiError::Internal("post view went missing".to_string()))
}

/// Loads the post and checks that `user` wrote it.
async fn authored_post(store: &dyn SocialStore, user: &AuthUser, post_id: Uuid) -> ApiResult<Post> {
    let post = store
        .find_post(post_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    if post.author_id != user.id {
        return Err(ApiError::Forbidden(
            "You can only modify your own posts".to_string(),
        ));
    }
    Ok(post)
}

async fn require_post(store: &dyn SocialStore, post_id: Uuid) -> ApiResult<Post> {
    store
        .find_post(post_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post"))
}

async fn list_posts(
    State(state): State<AppState>,
    user: AuthUser,
    Pagination(query): Pagination,
) -> ApiResult<Json<Paginated<PostView>>> {
    let store = state.store();
    let (summaries, count) = store.list_posts(user.id, &query).await?;
    let views = post_views(store, summaries).await?;
    Ok(Json(paginated(&query, count, views)?))
}

async fn create_post(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<PostView>)> {
    req.validate()?;
    let store = state.store();

    let post = Post::new(
        user.id,
        req.content,
        req.image.map(|image| image.trim().to_string()),
    );
    store.insert_post(&post).await?;
    tracing::info!(component = "posts", post_id = %post.id, author = %user.id, "post created");

    let view = post_view(store, user.id, post.id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_post(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(post_id): IdPath,
) -> ApiResult<Json<PostView>> {
    Ok(Json(post_view(state.store(), user.id, post_id).await?))
}

async fn update_post(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(post_id): IdPath,
    ApiJson(req): ApiJson<UpdatePostRequest>,
) -> ApiResult<Json<PostView>> {
    let store = state.store();
    authored_post(store, &user, post_id).await?;
    let changes = req.into_changes()?;

    store
        .update_post(post_id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    tracing::info!(component = "posts", post_id = %post_id, "post updated");

    Ok(Json(post_view(store, user.id, post_id).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(post_id): IdPath,
) -> ApiResult<StatusCode> {
    let store = state.store();
    authored_post(store, &user, post_id).await?;

    if !store.delete_post(post_id).await? {
        return Err(ApiError::not_found("Post"));
    }
    tracing::info!(component = "posts", post_id = %post_id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn like_post(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(post_id): IdPath,
) -> ApiResult<(StatusCode, Json<MessageBody>)> {
    let store = state.store();
    require_post(store, post_id).await?;

    if !store.insert_like(user.id, post_id).await? {
        return Err(ApiError::BadRequest("Post already liked".to_string()));
    }
    Ok((
        StatusCode::CREATED,
        Json(MessageBody::new("Post liked successfully")),
    ))
}

async fn unlike_post(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(post_id): IdPath,
) -> ApiResult<Json<MessageBody>> {
    let store = state.store();
    require_post(store, post_id).await?;

    if !store.delete_like(user.id, post_id).await? {
        return Err(ApiError::BadRequest("Post not liked yet".to_string()));
    }
    Ok(Json(MessageBody::new("Post unliked successfully")))
}

async fn list_post_comments(
    State(state): State<AppState>,
    _user: AuthUser,
    IdPath(post_id): IdPath,
    Pagination(query): Pagination,
) -> ApiResult<Json<Paginated<CommentView>>> {
    let (comments, count) = state.store().list_comments(post_id, &query).await?;
    Ok(Json(paginated(&query, count, comments)?))
}

async fn create_post_comment(
    State(state): State<AppState>,
    user: AuthUser,
    IdPath(post_id): IdPath,
    ApiJson(req): ApiJson<CommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentView>)> {
    req.validate()?;
    let store = state.store();
    require_post(store, post_id).await?;

    let comment = Comment::new(post_id, user.id, None, req.content);
    store.insert_comment(&comment).await?;
    tracing::info!(component = "comments", comment_id = %comment.id, post_id = %post_id, "comment created");

    let view = store
        .comment_view(comment.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{TestApp, TestUser};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    async fn create_post(app: &TestApp, user: &TestUser, content: &str) -> String {
        let (status, body) = app
            .post("/api/posts", Some(&user.token), json!({ "content": content }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().expect("post id").to_string()
    }

    #[tokio::test]
    async fn created_post_starts_empty() {
        let app = TestApp::new();
        let alice = app.register("alice").await;

        let (status, body) = app
            .post(
                "/api/posts",
                Some(&alice.token),
                json!({ "content": "Test post content", "image": "cat.JPG" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["content"], "Test post content");
        assert_eq!(body["image"], "cat.JPG");
        assert_eq!(body["author"]["username"], "alice");
        assert_eq!(body["likes_count"], 0);
        assert_eq!(body["is_liked"], false);
        assert_eq!(body["comments_count"], 0);
        assert_eq!(body["comments"], json!([]));
    }

    #[tokio::test]
    async fn create_rejects_blank_content_and_bad_images() {
        let app = TestApp::new();
        let alice = app.register("alice").await;

        let (status, body) = app
            .post(
                "/api/posts",
                Some(&alice.token),
                json!({ "content": "   ", "image": "clip.gif" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["fields"]["content"].is_array());
        assert!(body["fields"]["image"].is_array());

        let (status, _) = app
            .post(
                "/api/posts",
                Some(&alice.token),
                json!({ "content": "x".repeat(2001) }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn like_counts_are_global_and_is_liked_is_per_viewer() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let bob = app.register("bob").await;
        let post_id = create_post(&app, &alice, "Hello").await;

        let (status, body) = app
            .post(&format!("/api/posts/{post_id}/like"), Some(&bob.token), json!({}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Post liked successfully");

        let uri = format!("/api/posts/{post_id}");
        let (_, as_bob) = app.get(&uri, Some(&bob.token)).await;
        assert_eq!(as_bob["likes_count"], 1);
        assert_eq!(as_bob["is_liked"], true);

        let (_, as_alice) = app.get(&uri, Some(&alice.token)).await;
        assert_eq!(as_alice["likes_count"], 1);
        assert_eq!(as_alice["is_liked"], false);
    }

    #[tokio::test]
    async fn liking_twice_and_unliking_twice_are_rejected() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let post_id = create_post(&app, &alice, "Hello").await;
        let like = format!("/api/posts/{post_id}/like");
        let unlike = format!("/api/posts/{post_id}/unlike");

        app.post(&like, Some(&alice.token), json!({})).await;
        let (status, body) = app.post(&like, Some(&alice.token), json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Post already liked");

        let (status, body) = app.post(&unlike, Some(&alice.token), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Post unliked successfully");

        let (status, body) = app.post(&unlike, Some(&alice.token), json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Post not liked yet");

        let (_, body) = app
            .get(&format!("/api/posts/{post_id}"), Some(&alice.token))
            .await;
        assert_eq!(body["likes_count"], 0);
    }

    #[tokio::test]
    async fn liking_a_missing_post_is_not_found() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let (status, _) = app
            .post(
                &format!("/api/posts/{}/like", uuid::Uuid::new_v4()),
                Some(&alice.token),
                json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn only_the_author_may_edit_or_delete() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let bob = app.register("bob").await;
        let post_id = create_post(&app, &alice, "Original").await;
        let uri = format!("/api/posts/{post_id}");

        let (status, _) = app
            .patch(&uri, &bob.token, json!({ "content": "Hijacked" }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.delete(&uri, &bob.token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .patch(&uri, &alice.token, json!({ "content": "Edited" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "Edited");

        let (status, _) = app.delete(&uri, &alice.token).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.get(&uri, Some(&alice.token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_is_newest_first_with_comments_embedded() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let first = create_post(&app, &alice, "first").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = create_post(&app, &alice, "second").await;

        let (status, _) = app
            .post(
                &format!("/api/posts/{first}/comments"),
                Some(&alice.token),
                json!({ "content": "Nice" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app.get("/api/posts", Some(&alice.token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert!(body["next"].is_null());
        let results = body["results"].as_array().expect("results");
        assert_eq!(results[0]["id"], second.as_str());
        assert_eq!(results[1]["id"], first.as_str());
        assert_eq!(results[1]["comments_count"], 1);
        assert_eq!(results[1]["comments"][0]["content"], "Nice");
    }

    #[tokio::test]
    async fn page_size_splits_the_listing() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        for i in 0..3 {
            create_post(&app, &alice, &format!("post {i}")).await;
        }

        let (_, body) = app.get("/api/posts?page_size=2", Some(&alice.token)).await;
        assert_eq!(body["count"], 3);
        assert_eq!(body["next"], 2);
        assert_eq!(body["results"].as_array().map(Vec::len), Some(2));

        let (_, body) = app
            .get("/api/posts?page=2&page_size=2", Some(&alice.token))
            .await;
        assert_eq!(body["previous"], 1);
        assert!(body["next"].is_null());
        assert_eq!(body["results"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn commenting_on_a_missing_post_is_not_found() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let missing = uuid::Uuid::new_v4();

        let (status, _) = app
            .post(
                &format!("/api/posts/{missing}/comments"),
                Some(&alice.token),
                json!({ "content": "Hello?" }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app
            .get(&format!("/api/posts/{missing}/comments"), Some(&alice.token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"], Value::Array(vec![]));
    }

    #[tokio::test]
    async fn deleting_a_post_takes_its_comments_along() {
        let app = TestApp::new();
        let alice = app.register("alice").await;
        let post_id = create_post(&app, &alice, "Doomed").await;
        let (_, comment) = app
            .post(
                &format!("/api/posts/{post_id}/comments"),
                Some(&alice.token),
                json!({ "content": "Bye" }),
            )
            .await;
        let comment_id = comment["id"].as_str().expect("comment id").to_string();

        app.delete(&format!("/api/posts/{post_id}"), &alice.token).await;

        let (status, _) = app
            .get(&format!("/api/comments/{comment_id}"), Some(&alice.token))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
