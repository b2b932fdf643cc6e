use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_proto::pagination::PageQuery;
use shared_proto::social::ConnectionStatus;
use sqlx::{postgres::PgPoolOptions, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::{SocialStore, StoreError, StoreResult, RECOMMENDATION_LIMIT};
use crate::models::{
    AuthToken, Comment, CommentView, Connection, NewUser, Post, PostChanges, PostSummary, Profile,
    ProfileChanges, ProfileView, Recommendation, User, UserPublic,
};
use crate::validation::{slug_candidate, slugify};

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, date_joined";
const PROFILE_COLUMNS: &str = "user_id, bio, profile_picture, slug, created_at, updated_at";
const POST_COLUMNS: &str = "id, author_id, content, image, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, post_id, author_id, parent_id, content, created_at, updated_at";
const CONNECTION_COLUMNS: &str = "id, sender_id, receiver_id, status, created_at, updated_at";

const POST_SUMMARY_SELECT: &str = r#"
    SELECT p.id, p.author_id, p.content, p.image, p.created_at, p.updated_at,
           u.username AS author_username, u.email AS author_email,
           u.first_name AS author_first_name, u.last_name AS author_last_name,
           u.date_joined AS author_date_joined,
           (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS likes_count,
           EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = $1) AS is_liked,
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comments_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

const COMMENT_VIEW_SELECT: &str = r#"
    SELECT c.id, c.post_id, c.author_id, c.parent_id, c.content, c.created_at, c.updated_at,
           u.username AS author_username, u.email AS author_email,
           u.first_name AS author_first_name, u.last_name AS author_last_name,
           u.date_joined AS author_date_joined
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

#[derive(Debug, FromRow)]
struct ConnectionRow {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ConnectionRow> for Connection {
    type Error = StoreError;

    fn try_from(row: ConnectionRow) -> Result<Self, Self::Error> {
        let status = ConnectionStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Unavailable(format!("unknown connection status '{}'", row.status))
        })?;
        Ok(Connection {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PostSummaryRow {
    id: Uuid,
    author_id: Uuid,
    content: String,
    image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    author_username: String,
    author_email: String,
    author_first_name: String,
    author_last_name: String,
    author_date_joined: DateTime<Utc>,
    likes_count: i64,
    is_liked: bool,
    comments_count: i64,
}

impl From<PostSummaryRow> for PostSummary {
    fn from(row: PostSummaryRow) -> Self {
        PostSummary {
            author: UserPublic {
                id: row.author_id,
                username: row.author_username,
                email: row.author_email,
                first_name: row.author_first_name,
                last_name: row.author_last_name,
                date_joined: row.author_date_joined,
            },
            post: Post {
                id: row.id,
                author_id: row.author_id,
                content: row.content,
                image: row.image,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            likes_count: row.likes_count,
            is_liked: row.is_liked,
            comments_count: row.comments_count,
        }
    }
}

#[derive(Debug, FromRow)]
struct CommentViewRow {
    id: Uuid,
    post_id: Uuid,
    author_id: Uuid,
    parent_id: Option<Uuid>,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    author_username: String,
    author_email: String,
    author_first_name: String,
    author_last_name: String,
    author_date_joined: DateTime<Utc>,
}

impl From<CommentViewRow> for CommentView {
    fn from(row: CommentViewRow) -> Self {
        let author = UserPublic {
            id: row.author_id,
            username: row.author_username,
            email: row.author_email,
            first_name: row.author_first_name,
            last_name: row.author_last_name,
            date_joined: row.author_date_joined,
        };
        let comment = Comment {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            parent_id: row.parent_id,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        CommentView::new(comment, author)
    }
}

#[derive(Debug, FromRow)]
struct RecommendationRow {
    id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    date_joined: DateTime<Utc>,
    bio: Option<String>,
    profile_picture: Option<String>,
    slug: Option<String>,
    profile_created_at: Option<DateTime<Utc>>,
    profile_updated_at: Option<DateTime<Utc>>,
    mutual_connections_count: i64,
}

impl From<RecommendationRow> for Recommendation {
    fn from(row: RecommendationRow) -> Self {
        let user = UserPublic {
            id: row.id,
            username: row.username.clone(),
            email: row.email,
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            date_joined: row.date_joined,
        };
        let profile = match (row.slug, row.profile_created_at, row.profile_updated_at) {
            (Some(slug), Some(created_at), Some(updated_at)) => Some(ProfileView::new(
                user,
                Profile {
                    user_id: row.id,
                    bio: row.bio.unwrap_or_default(),
                    profile_picture: row.profile_picture,
                    slug,
                    created_at,
                    updated_at,
                },
            )),
            _ => None,
        };
        Recommendation {
            id: row.id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            profile,
            mutual_connections_count: row.mutual_connections_count,
        }
    }
}

/// Maps a unique or foreign key violation on `constraint` to a conflict.
fn conflict_on(err: sqlx::Error, constraint: &str, message: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.constraint() == Some(constraint) {
            return StoreError::Conflict(message.to_string());
        }
    }
    StoreError::Database(err)
}

fn limit_offset(page: &PageQuery) -> (i64, i64) {
    (
        i64::from(page.page_size()),
        i64::try_from(page.offset()).unwrap_or(i64::MAX),
    )
}

/// Inserts a profile for `user_id`, walking `slug`, `slug-1`, `slug-2`...
/// until the unique index accepts one.
async fn insert_profile(
    conn: &mut PgConnection,
    user_id: Uuid,
    username: &str,
) -> StoreResult<Profile> {
    let base = slugify(username);
    let mut attempt = 0;
    loop {
        let slug = slug_candidate(&base, attempt);
        let inserted = sqlx::query_as::<_, Profile>(&format!(
            "INSERT INTO user_profiles (user_id, slug) VALUES ($1, $2) \
             ON CONFLICT (slug) DO NOTHING RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(user_id)
        .bind(&slug)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(profile) = inserted {
            return Ok(profile);
        }
        attempt += 1;
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens the pool and brings the schema up to date.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl SocialStore for PgStore {
    async fn create_user(&self, new_user: NewUser) -> StoreResult<(User, Profile)> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            conflict_on(
                e,
                "users_username_key",
                "A user with that username already exists.",
            )
        })?;

        let profile = insert_profile(&mut *tx, user.id, &user.username).await?;
        tx.commit().await?;
        Ok((user, profile))
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_token(&self, token: &AuthToken) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO auth_tokens (jti, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(token.jti)
        .bind(token.user_id)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_token(&self, jti: Uuid) -> StoreResult<Option<AuthToken>> {
        Ok(sqlx::query_as::<_, AuthToken>(
            "SELECT jti, user_id, created_at, expires_at FROM auth_tokens WHERE jti = $1",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_token(&self, jti: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE jti = $1")
            .bind(jti)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_tokens(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_or_create_profile(&self, user_id: Uuid) -> StoreResult<Profile> {
        if let Some(profile) = self.find_profile(user_id).await? {
            return Ok(profile);
        }

        let username = sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::Unavailable(format!("no user {user_id}")))?;

        let mut conn = self.pool.acquire().await?;
        match insert_profile(&mut *conn, user_id, &username).await {
            Ok(profile) => Ok(profile),
            // Another request created it first.
            Err(StoreError::Database(sqlx::Error::Database(db_err)))
                if db_err.constraint() == Some("user_profiles_pkey") =>
            {
                self.find_profile(user_id)
                    .await?
                    .ok_or_else(|| StoreError::Unavailable(format!("no profile for {user_id}")))
            }
            Err(err) => Err(err),
        }
    }

    async fn update_profile(&self, user_id: Uuid, changes: ProfileChanges) -> StoreResult<Profile> {
        self.get_or_create_profile(user_id).await?;

        let (picture_given, picture) = match changes.profile_picture {
            Some(picture) => (true, picture),
            None => (false, None),
        };
        Ok(sqlx::query_as::<_, Profile>(&format!(
            r#"
            UPDATE user_profiles
            SET bio = COALESCE($2, bio),
                profile_picture = CASE WHEN $3 THEN $4 ELSE profile_picture END,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(changes.bio)
        .bind(picture_given)
        .bind(picture)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO posts ({POST_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(post.id)
        .bind(post.author_id)
        .bind(&post.content)
        .bind(&post.image)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_post(&self, id: Uuid) -> StoreResult<Option<Post>> {
        Ok(
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_posts(
        &self,
        viewer: Uuid,
        page: &PageQuery,
    ) -> StoreResult<(Vec<PostSummary>, u64)> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, PostSummaryRow>(&format!(
            "{POST_SUMMARY_SELECT} ORDER BY p.created_at DESC, p.id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(viewer)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;

        Ok((
            rows.into_iter().map(PostSummary::from).collect(),
            total.max(0) as u64,
        ))
    }

    async fn post_summary(&self, viewer: Uuid, id: Uuid) -> StoreResult<Option<PostSummary>> {
        let row = sqlx::query_as::<_, PostSummaryRow>(&format!(
            "{POST_SUMMARY_SELECT} WHERE p.id = $2"
        ))
        .bind(viewer)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PostSummary::from))
    }

    async fn update_post(&self, id: Uuid, changes: PostChanges) -> StoreResult<Option<Post>> {
        let (image_given, image) = match changes.image {
            Some(image) => (true, image),
            None => (false, None),
        };
        Ok(sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET content = COALESCE($2, content),
                image = CASE WHEN $3 THEN $4 ELSE image END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.content)
        .bind(image_given)
        .bind(image)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<bool> {
        // Likes and comments go with the post through their foreign keys.
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_like(&self, user_id: Uuid, post_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO likes (user_id, post_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, post_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_like(&self, user_id: Uuid, post_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM likes WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO comments ({COMMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(comment.id)
        .bind(comment.post_id)
        .bind(comment.author_id)
        .bind(comment.parent_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on(e, "comments_parent_id_fkey", "Parent comment does not exist"))?;
        Ok(())
    }

    async fn find_comment(&self, id: Uuid) -> StoreResult<Option<Comment>> {
        Ok(sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn comment_view(&self, id: Uuid) -> StoreResult<Option<CommentView>> {
        let row = sqlx::query_as::<_, CommentViewRow>(&format!(
            "{COMMENT_VIEW_SELECT} WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CommentView::from))
    }

    async fn list_comments(
        &self,
        post_id: Uuid,
        page: &PageQuery,
    ) -> StoreResult<(Vec<CommentView>, u64)> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, CommentViewRow>(&format!(
            "{COMMENT_VIEW_SELECT} WHERE c.post_id = $1 \
             ORDER BY c.created_at ASC, c.id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(post_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((
            rows.into_iter().map(CommentView::from).collect(),
            total.max(0) as u64,
        ))
    }

    async fn comments_for_posts(&self, post_ids: &[Uuid]) -> StoreResult<Vec<CommentView>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, CommentViewRow>(&format!(
            "{COMMENT_VIEW_SELECT} WHERE c.post_id = ANY($1) ORDER BY c.created_at ASC, c.id ASC"
        ))
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CommentView::from).collect())
    }

    async fn update_comment(&self, id: Uuid, content: String) -> StoreResult<Option<Comment>> {
        Ok(sqlx::query_as::<_, Comment>(&format!(
            r#"
            UPDATE comments SET content = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {COMMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_comment_tree(&self, id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            WITH RECURSIVE thread AS (
                SELECT id FROM comments WHERE id = $1
                UNION ALL
                SELECT c.id FROM comments c JOIN thread t ON c.parent_id = t.id
            )
            DELETE FROM comments WHERE id IN (SELECT id FROM thread)
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_connection(&self, connection: &Connection) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO connections ({CONNECTION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(connection.id)
        .bind(connection.sender_id)
        .bind(connection.receiver_id)
        .bind(connection.status.as_str())
        .bind(connection.created_at)
        .bind(connection.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match conflict_on(e, "connections_pair_key", "Connection already exists") {
            StoreError::Database(e) => {
                conflict_on(e, "connections_not_self", "Cannot connect to yourself")
            }
            other => other,
        })?;
        Ok(())
    }

    async fn resolve_connection(
        &self,
        id: Uuid,
        receiver_id: Uuid,
        status: ConnectionStatus,
    ) -> StoreResult<Option<Connection>> {
        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            UPDATE connections
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND receiver_id = $2 AND status = 'pending'
            RETURNING {CONNECTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(receiver_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Connection::try_from).transpose()
    }

    async fn list_incoming(
        &self,
        receiver_id: Uuid,
        page: &PageQuery,
    ) -> StoreResult<(Vec<Connection>, u64)> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            SELECT {CONNECTION_COLUMNS} FROM connections
            WHERE receiver_id = $1 AND status = 'pending'
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(receiver_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM connections WHERE receiver_id = $1 AND status = 'pending'",
        )
        .bind(receiver_id)
        .fetch_one(&self.pool)
        .await?;

        let connections = rows
            .into_iter()
            .map(Connection::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((connections, total.max(0) as u64))
    }

    async fn are_connected(&self, a: Uuid, b: Uuid) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM connections
                WHERE status = 'accepted'
                AND ((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))
            )
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn accepted_counterparts(&self, user_id: Uuid) -> StoreResult<Vec<UserPublic>> {
        Ok(sqlx::query_as::<_, UserPublic>(
            r#"
            SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.date_joined
            FROM connections c
            JOIN users u ON u.id = CASE
                WHEN c.sender_id = $1 THEN c.receiver_id
                ELSE c.sender_id
            END
            WHERE (c.sender_id = $1 OR c.receiver_id = $1) AND c.status = 'accepted'
            ORDER BY u.username
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn recommendations(&self, user_id: Uuid) -> StoreResult<Vec<Recommendation>> {
        let rows = sqlx::query_as::<_, RecommendationRow>(
            r#"
            WITH linked AS (
                SELECT CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END AS user_id,
                       status
                FROM connections
                WHERE (sender_id = $1 OR receiver_id = $1)
                AND status IN ('accepted', 'pending')
            ),
            friends AS (
                SELECT user_id FROM linked WHERE status = 'accepted'
            )
            SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.date_joined,
                   p.bio, p.profile_picture, p.slug,
                   p.created_at AS profile_created_at, p.updated_at AS profile_updated_at,
                   (
                       SELECT COUNT(DISTINCT f.user_id)
                       FROM connections c
                       JOIN friends f ON f.user_id = CASE
                           WHEN c.sender_id = u.id THEN c.receiver_id
                           ELSE c.sender_id
                       END
                       WHERE (c.sender_id = u.id OR c.receiver_id = u.id)
                       AND c.status = 'accepted'
                   ) AS mutual_connections_count
            FROM users u
            LEFT JOIN user_profiles p ON p.user_id = u.id
            WHERE u.id <> $1
            AND u.id NOT IN (SELECT user_id FROM linked)
            ORDER BY mutual_connections_count DESC, random()
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(RECOMMENDATION_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Recommendation::from).collect())
    }
}
