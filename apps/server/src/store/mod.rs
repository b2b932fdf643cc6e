//! Persistence seam for accounts, content and the connection graph.
//!
//! Handlers only talk to [`SocialStore`]. Uniqueness rules (username, slug,
//! like pair, unordered connection pair) are enforced inside each adapter so
//! that two racing requests cannot both succeed.

use async_trait::async_trait;
use shared_proto::pagination::PageQuery;
use shared_proto::social::ConnectionStatus;
use uuid::Uuid;

use crate::models::{
    AuthToken, Comment, CommentView, Connection, NewUser, Post, PostChanges, PostSummary, Profile,
    ProfileChanges, Recommendation, User, UserPublic,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Maximum number of users returned by [`SocialStore::recommendations`].
pub const RECOMMENDATION_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness rule rejected the write.
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait SocialStore: Send + Sync {
    // --- accounts ---

    /// Creates the account and its profile together. The profile slug is
    /// derived from the username and suffixed until unique.
    async fn create_user(&self, user: NewUser) -> StoreResult<(User, Profile)>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    // --- tokens ---

    async fn insert_token(&self, token: &AuthToken) -> StoreResult<()>;

    async fn find_token(&self, jti: Uuid) -> StoreResult<Option<AuthToken>>;

    async fn delete_token(&self, jti: Uuid) -> StoreResult<bool>;

    /// Returns how many tokens were revoked.
    async fn delete_user_tokens(&self, user_id: Uuid) -> StoreResult<u64>;

    // --- profiles ---

    async fn get_or_create_profile(&self, user_id: Uuid) -> StoreResult<Profile>;

    async fn update_profile(&self, user_id: Uuid, changes: ProfileChanges) -> StoreResult<Profile>;

    // --- posts ---

    async fn insert_post(&self, post: &Post) -> StoreResult<()>;

    async fn find_post(&self, id: Uuid) -> StoreResult<Option<Post>>;

    /// Newest first, counts and `is_liked` relative to `viewer`.
    async fn list_posts(&self, viewer: Uuid, page: &PageQuery)
        -> StoreResult<(Vec<PostSummary>, u64)>;

    async fn post_summary(&self, viewer: Uuid, id: Uuid) -> StoreResult<Option<PostSummary>>;

    async fn update_post(&self, id: Uuid, changes: PostChanges) -> StoreResult<Option<Post>>;

    /// Removes the post along with its likes and comments.
    async fn delete_post(&self, id: Uuid) -> StoreResult<bool>;

    // --- likes ---

    /// Returns `false` when the like already existed.
    async fn insert_like(&self, user_id: Uuid, post_id: Uuid) -> StoreResult<bool>;

    /// Returns `false` when there was no like to remove.
    async fn delete_like(&self, user_id: Uuid, post_id: Uuid) -> StoreResult<bool>;

    // --- comments ---

    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()>;

    async fn find_comment(&self, id: Uuid) -> StoreResult<Option<Comment>>;

    async fn comment_view(&self, id: Uuid) -> StoreResult<Option<CommentView>>;

    /// Oldest first.
    async fn list_comments(&self, post_id: Uuid, page: &PageQuery)
        -> StoreResult<(Vec<CommentView>, u64)>;

    /// Every comment of each post in `post_ids`, oldest first.
    async fn comments_for_posts(&self, post_ids: &[Uuid]) -> StoreResult<Vec<CommentView>>;

    async fn update_comment(&self, id: Uuid, content: String) -> StoreResult<Option<Comment>>;

    /// Deletes the comment and every reply below it. Returns the number of
    /// rows removed.
    async fn delete_comment_tree(&self, id: Uuid) -> StoreResult<u64>;

    // --- connections ---

    /// Inserts a pending request unless any row already joins the two users
    /// in either direction.
    async fn insert_connection(&self, connection: &Connection) -> StoreResult<()>;

    /// Moves a pending connection addressed to `receiver_id` into `status`.
    /// `None` when no such pending row exists.
    async fn resolve_connection(
        &self,
        id: Uuid,
        receiver_id: Uuid,
        status: ConnectionStatus,
    ) -> StoreResult<Option<Connection>>;

    async fn list_incoming(&self, receiver_id: Uuid, page: &PageQuery)
        -> StoreResult<(Vec<Connection>, u64)>;

    async fn are_connected(&self, a: Uuid, b: Uuid) -> StoreResult<bool>;

    async fn accepted_counterparts(&self, user_id: Uuid) -> StoreResult<Vec<UserPublic>>;

    /// At most [`RECOMMENDATION_LIMIT`] users, ranked by mutual connections.
    async fn recommendations(&self, user_id: Uuid) -> StoreResult<Vec<Recommendation>>;
}
