use axum::{extract::State, routing::get, Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extractors::{nullable, ApiJson};
use crate::models::{ProfileChanges, ProfileView};
use crate::state::AppState;
use crate::store::SocialStore;
use crate::validation::{validate_bio, validate_image_ref};

pub fn router() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile).patch(update_profile))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub profile_picture: Option<Option<String>>,
}

impl UpdateProfileRequest {
    fn into_changes(self) -> ApiResult<ProfileChanges> {
        let mut errors = ValidationErrors::new();
        if let Some(bio) = &self.bio {
            if let Err(e) = validate_bio(bio) {
                errors.add("bio", e);
            }
        }
        if let Some(Some(picture)) = &self.profile_picture {
            if let Err(e) = validate_image_ref(picture) {
                errors.add("profile_picture", e);
            }
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(ProfileChanges {
            bio: self.bio,
            profile_picture: self
                .profile_picture
                .map(|picture| picture.map(|p| p.trim().to_string())),
        })
    }
}

/// Profile of `user_id` with its owner embedded, created on first access.
pub(crate) async fn profile_view(store: &dyn SocialStore, user_id: Uuid) -> ApiResult<ProfileView> {
    let user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let profile = store.get_or_create_profile(user_id).await?;
    Ok(ProfileView::new(user.into(), profile))
}

async fn get_profile(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<ProfileView>> {
    Ok(Json(profile_view(state.store(), user.id).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileView>> {
    let changes = req.into_changes()?;
    let store = state.store();

    store.get_or_create_profile(user.id).await?;
    store.update_profile(user.id, changes).await?;
    let view = profile_view(store, user.id).await?;

    tracing::info!(component = "profile", user_id = %user.id, "profile updated");
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn profile_exists_right_after_registration() {
        let app = TestApp::new();
        let alice = app.register("alice").await;

        let (status, body) = app.get("/api/profile", Some(&alice.token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "alice");
        assert_eq!(body["slug"], "alice");
        assert_eq!(body["bio"], "");
        assert!(body["profile_picture"].is_null());
    }

    #[tokio::test]
    async fn patch_updates_only_given_fields() {
        let app = TestApp::new();
        let alice = app.register("alice").await;

        let (status, body) = app
            .patch(
                "/api/profile",
                &alice.token,
                json!({ "bio": "Hello", "profile_picture": "pics/me.png" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bio"], "Hello");
        assert_eq!(body["profile_picture"], "pics/me.png");

        let (_, body) = app
            .patch("/api/profile", &alice.token, json!({ "bio": "Updated" }))
            .await;
        assert_eq!(body["bio"], "Updated");
        assert_eq!(body["profile_picture"], "pics/me.png");

        let (_, body) = app
            .patch("/api/profile", &alice.token, json!({ "profile_picture": null }))
            .await;
        assert_eq!(body["bio"], "Updated");
        assert!(body["profile_picture"].is_null());
    }

    #[tokio::test]
    async fn patch_rejects_long_bio_and_non_images() {
        let app = TestApp::new();
        let alice = app.register("alice").await;

        let (status, body) = app
            .patch(
                "/api/profile",
                &alice.token,
                json!({ "bio": "x".repeat(501), "profile_picture": "notes.txt" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["fields"]["bio"].is_array());
        assert!(body["fields"]["profile_picture"].is_array());

        let (_, body) = app.get("/api/profile", Some(&alice.token)).await;
        assert_eq!(body["bio"], "");
    }
}
