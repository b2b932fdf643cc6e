use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::models::{AuthToken, NewUser, User, UserPublic};
use crate::state::AppState;
use crate::store::SocialStore;
use crate::validation::{normalize_email, normalize_username, validate_username};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub username: String,
    pub jti: Uuid,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 150), custom(function = "validate_username"))]
    pub username: String,
    #[validate(email, length(max = 254))]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub password_confirm: String,
    #[validate(length(max = 150))]
    #[serde(default)]
    pub first_name: String,
    #[validate(length(max = 150))]
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserPublic,
}

/// Signs and checks bearer tokens.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        if config.uses_dev_secret() {
            tracing::warn!(
                component = "auth",
                "JWT_SECRET not set, using insecure default. Set JWT_SECRET in production!"
            );
        }
        Self::new(&config.jwt_secret, Duration::hours(config.token_ttl_hours))
    }

    /// Signs a token for `user` and returns the record that must be stored
    /// for it to be accepted.
    pub fn issue(&self, user: &User) -> ApiResult<(String, AuthToken)> {
        let now = Utc::now();
        let record = AuthToken {
            jti: Uuid::new_v4(),
            user_id: user.id,
            created_at: now,
            expires_at: now + self.ttl,
        };

        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            jti: record.jti,
            exp: record.expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))?;
        Ok((token, record))
    }

    /// Checks signature and expiry. Revocation is checked against the store
    /// by [`AuthUser`].
    pub fn validate(&self, token: &str) -> ApiResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::invalid_token())
    }
}

/// Hash password using Argon2
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ApiError::Internal("password hashing failed".to_string()))
}

/// Verify password against hash
pub fn verify_password(password: &str, hash: &str) -> ApiResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| ApiError::Internal("stored password hash is malformed".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

async fn issue_token(
    store: &dyn SocialStore,
    keys: &TokenKeys,
    user: &User,
) -> ApiResult<String> {
    let (token, record) = keys.issue(user)?;
    store.insert_token(&record).await?;
    Ok(token)
}

/// Register a new user together with their profile.
pub async fn register(
    store: &dyn SocialStore,
    keys: &TokenKeys,
    req: RegisterRequest,
) -> ApiResult<AuthResponse> {
    req.validate()?;
    if req.password != req.password_confirm {
        return Err(ApiError::non_field("Passwords don't match"));
    }

    let new_user = NewUser {
        username: normalize_username(&req.username),
        email: req.email.as_deref().map(normalize_email).unwrap_or_default(),
        password_hash: hash_password(&req.password)?,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
    };

    let (user, profile) = store.create_user(new_user).await?;
    let token = issue_token(store, keys, &user).await?;

    tracing::info!(
        component = "auth",
        user_id = %user.id,
        slug = %profile.slug,
        "user registered"
    );
    Ok(AuthResponse {
        token,
        user: user.into(),
    })
}

/// Login user
pub async fn login(
    store: &dyn SocialStore,
    keys: &TokenKeys,
    req: LoginRequest,
) -> ApiResult<AuthResponse> {
    req.validate()?;

    let username = normalize_username(&req.username);
    let user = store
        .find_user_by_username(&username)
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::invalid_credentials());
    }

    let token = issue_token(store, keys, &user).await?;
    tracing::info!(component = "auth", user_id = %user.id, "user logged in");
    Ok(AuthResponse {
        token,
        user: user.into(),
    })
}

/// Revoke the token the request was made with.
pub async fn logout(store: &dyn SocialStore, user: &AuthUser) -> ApiResult<()> {
    store.delete_token(user.jti).await?;
    tracing::info!(component = "auth", user_id = %user.id, "token revoked");
    Ok(())
}

/// Revoke every token issued to the user.
pub async fn logout_all(store: &dyn SocialStore, user: &AuthUser) -> ApiResult<()> {
    let revoked = store.delete_user_tokens(user.id).await?;
    tracing::info!(component = "auth", user_id = %user.id, revoked, "all tokens revoked");
    Ok(())
}

/// Authenticated user extractor for Axum
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub jti: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| {
                ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
            })?;

        let claims = state.tokens.validate(bearer.token())?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::invalid_token())?;

        let record = state
            .store
            .find_token(claims.jti)
            .await?
            .filter(|record| record.user_id == user_id && record.expires_at > Utc::now())
            .ok_or_else(ApiError::invalid_token)?;

        Ok(AuthUser {
            id: record.user_id,
            jti: record.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn keys() -> TokenKeys {
        TokenKeys::new(b"test-secret", Duration::hours(1))
    }

    fn register_request(username: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: Some(format!("{username}@example.com")),
            password: "testpassword123".to_string(),
            password_confirm: "testpassword123".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
        }
    }

    #[test]
    fn password_hash_round_trips() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(verify_password("correct horse", &hash).expect("verify"));
        assert!(!verify_password("battery staple", &hash).expect("verify"));
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: String::new(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            date_joined: Utc::now(),
        };
        let (token, record) = keys().issue(&user).expect("issue");
        let claims = keys().validate(&token).expect("valid");
        assert_eq!(claims.jti, record.jti);
        assert_eq!(claims.sub, user.id.to_string());

        let other = TokenKeys::new(b"other-secret", Duration::hours(1));
        assert!(other.validate(&token).is_err());
    }

    #[tokio::test]
    async fn register_rejects_mismatched_passwords() {
        let store = MemoryStore::new();
        let mut req = register_request("alice");
        req.password_confirm = "wrongpassword".to_string();

        let err = register(&store, &keys(), req).await.expect_err("mismatch");
        match err {
            ApiError::Validation(fields) => assert_eq!(
                fields.get("non_field_errors"),
                Some(&vec!["Passwords don't match".to_string()])
            ),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store
            .find_user_by_username("alice")
            .await
            .expect("query")
            .is_none());
    }

    #[tokio::test]
    async fn register_then_login_issues_stored_tokens() {
        let store = MemoryStore::new();
        let registered = register(&store, &keys(), register_request("alice"))
            .await
            .expect("register");
        assert_eq!(registered.user.username, "alice");

        let logged_in = login(
            &store,
            &keys(),
            LoginRequest {
                username: "alice".to_string(),
                password: "testpassword123".to_string(),
            },
        )
        .await
        .expect("login");

        for token in [&registered.token, &logged_in.token] {
            let claims = keys().validate(token).expect("valid");
            assert!(store.find_token(claims.jti).await.expect("query").is_some());
        }
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_unauthorized() {
        let store = MemoryStore::new();
        register(&store, &keys(), register_request("alice"))
            .await
            .expect("register");

        let err = login(
            &store,
            &keys(),
            LoginRequest {
                username: "alice".to_string(),
                password: "wrongpassword".to_string(),
            },
        )
        .await
        .expect_err("bad password");
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn extractor_resolves_the_stored_token_record() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), keys());
        let registered = register(state.store(), &state.tokens, register_request("alice"))
            .await
            .expect("register");

        let (mut parts, _) = axum::http::Request::builder()
            .header("authorization", format!("Bearer {}", registered.token))
            .body(())
            .expect("request")
            .into_parts();
        let user = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect("authenticated");

        assert_eq!(user.id, registered.user.id);
        let claims = keys().validate(&registered.token).expect("valid");
        assert_eq!(user.jti, claims.jti);

        logout(state.store(), &user).await.expect("logout");
        let (mut parts, _) = axum::http::Request::builder()
            .header("authorization", format!("Bearer {}", registered.token))
            .body(())
            .expect("request")
            .into_parts();
        assert!(AuthUser::from_request_parts(&mut parts, &state).await.is_err());
    }
}
