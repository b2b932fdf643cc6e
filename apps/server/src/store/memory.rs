use async_trait::async_trait;
use chrono::Utc;
use shared_proto::pagination::PageQuery;
use shared_proto::social::ConnectionStatus;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{SocialStore, StoreError, StoreResult, RECOMMENDATION_LIMIT};
use crate::graph;
use crate::models::{
    AuthToken, Comment, CommentView, Connection, Like, NewUser, Post, PostChanges, PostSummary,
    Profile, ProfileChanges, ProfileView, Recommendation, User, UserPublic,
};
use crate::validation::{slug_candidate, slugify};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, Profile>,
    tokens: HashMap<Uuid, AuthToken>,
    posts: HashMap<Uuid, Post>,
    likes: HashMap<(Uuid, Uuid), Like>,
    comments: HashMap<Uuid, Comment>,
    connections: HashMap<Uuid, Connection>,
}

impl Tables {
    fn public_user(&self, id: Uuid) -> StoreResult<UserPublic> {
        self.users
            .get(&id)
            .cloned()
            .map(UserPublic::from)
            .ok_or_else(|| StoreError::Unavailable(format!("dangling user reference {id}")))
    }

    fn unique_slug(&self, username: &str) -> String {
        let base = slugify(username);
        let taken: HashSet<&str> = self.profiles.values().map(|p| p.slug.as_str()).collect();
        let mut attempt = 0;
        loop {
            let candidate = slug_candidate(&base, attempt);
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            attempt += 1;
        }
    }

    fn summarize(&self, viewer: Uuid, post: &Post) -> StoreResult<PostSummary> {
        let likes_count = self.likes.keys().filter(|(_, p)| *p == post.id).count();
        let comments_count = self.comments.values().filter(|c| c.post_id == post.id).count();
        Ok(PostSummary {
            author: self.public_user(post.author_id)?,
            likes_count: likes_count as i64,
            is_liked: self.likes.contains_key(&(viewer, post.id)),
            comments_count: comments_count as i64,
            post: post.clone(),
        })
    }

    fn comment_view(&self, comment: &Comment) -> StoreResult<CommentView> {
        Ok(CommentView::new(
            comment.clone(),
            self.public_user(comment.author_id)?,
        ))
    }

    fn comments_oldest_first<'a>(&'a self, post_ids: &HashSet<Uuid>) -> Vec<&'a Comment> {
        let mut comments: Vec<&Comment> = self
            .comments
            .values()
            .filter(|c| post_ids.contains(&c.post_id))
            .collect();
        comments.sort_by_key(|c| (c.created_at, c.id));
        comments
    }

    /// Ids of `root` and every reply beneath it.
    fn comment_subtree(&self, root: Uuid) -> Vec<Uuid> {
        let mut found = vec![root];
        let mut cursor = 0;
        while cursor < found.len() {
            let parent = found[cursor];
            found.extend(
                self.comments
                    .values()
                    .filter(|c| c.parent_id == Some(parent))
                    .map(|c| c.id),
            );
            cursor += 1;
        }
        found
    }

    fn recommend(&self, user_id: Uuid) -> StoreResult<Vec<Recommendation>> {
        let connections: Vec<Connection> = self.connections.values().cloned().collect();
        let mut rng = rand::thread_rng();
        let ranked = graph::rank_candidates(
            user_id,
            self.users.keys().copied(),
            &connections,
            RECOMMENDATION_LIMIT,
            &mut rng,
        );

        ranked
            .into_iter()
            .map(|(id, mutual)| {
                let user = self.public_user(id)?;
                let profile = self
                    .profiles
                    .get(&id)
                    .cloned()
                    .map(|profile| ProfileView::new(user.clone(), profile));
                Ok(Recommendation {
                    id,
                    username: user.username,
                    first_name: user.first_name,
                    last_name: user.last_name,
                    profile,
                    mutual_connections_count: mutual,
                })
            })
            .collect()
    }
}

fn paginate<T: Clone>(items: &[T], page: &PageQuery) -> Vec<T> {
    items
        .iter()
        .skip(page.offset() as usize)
        .take(page.page_size() as usize)
        .cloned()
        .collect()
}

/// Store kept entirely in process memory. Every operation runs under one
/// lock, so checks and writes are atomic with respect to each other.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SocialStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> StoreResult<(User, Profile)> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.username == new_user.username)
        {
            return Err(StoreError::Conflict(
                "A user with that username already exists.".to_string(),
            ));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            date_joined: Utc::now(),
        };
        let profile = Profile::new(user.id, tables.unique_slug(&user.username));

        tables.users.insert(user.id, user.clone());
        tables.profiles.insert(user.id, profile.clone());
        Ok((user, profile))
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn insert_token(&self, token: &AuthToken) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.tokens.insert(token.jti, token.clone());
        Ok(())
    }

    async fn find_token(&self, jti: Uuid) -> StoreResult<Option<AuthToken>> {
        Ok(self.tables.read().await.tokens.get(&jti).cloned())
    }

    async fn delete_token(&self, jti: Uuid) -> StoreResult<bool> {
        Ok(self.tables.write().await.tokens.remove(&jti).is_some())
    }

    async fn delete_user_tokens(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.tokens.len();
        tables.tokens.retain(|_, token| token.user_id != user_id);
        Ok((before - tables.tokens.len()) as u64)
    }

    async fn get_or_create_profile(&self, user_id: Uuid) -> StoreResult<Profile> {
        let mut tables = self.tables.write().await;
        if let Some(profile) = tables.profiles.get(&user_id) {
            return Ok(profile.clone());
        }
        let username = tables.public_user(user_id)?.username;
        let profile = Profile::new(user_id, tables.unique_slug(&username));
        tables.profiles.insert(user_id, profile.clone());
        Ok(profile)
    }

    async fn update_profile(&self, user_id: Uuid, changes: ProfileChanges) -> StoreResult<Profile> {
        let mut tables = self.tables.write().await;
        let profile = tables
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Unavailable(format!("no profile for {user_id}")))?;
        if let Some(bio) = changes.bio {
            profile.bio = bio;
        }
        if let Some(picture) = changes.profile_picture {
            profile.profile_picture = picture;
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        self.tables.write().await.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn find_post(&self, id: Uuid) -> StoreResult<Option<Post>> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn list_posts(
        &self,
        viewer: Uuid,
        page: &PageQuery,
    ) -> StoreResult<(Vec<PostSummary>, u64)> {
        let tables = self.tables.read().await;
        let mut posts: Vec<&Post> = tables.posts.values().collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = posts.len() as u64;
        let summaries = paginate(&posts, page)
            .into_iter()
            .map(|post| tables.summarize(viewer, post))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((summaries, total))
    }

    async fn post_summary(&self, viewer: Uuid, id: Uuid) -> StoreResult<Option<PostSummary>> {
        let tables = self.tables.read().await;
        tables
            .posts
            .get(&id)
            .map(|post| tables.summarize(viewer, post))
            .transpose()
    }

    async fn update_post(&self, id: Uuid, changes: PostChanges) -> StoreResult<Option<Post>> {
        let mut tables = self.tables.write().await;
        let Some(post) = tables.posts.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(content) = changes.content {
            post.content = content;
        }
        if let Some(image) = changes.image {
            post.image = image;
        }
        post.updated_at = Utc::now();
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.posts.remove(&id).is_none() {
            return Ok(false);
        }
        tables.likes.retain(|(_, post_id), _| *post_id != id);
        tables.comments.retain(|_, c| c.post_id != id);
        Ok(true)
    }

    async fn insert_like(&self, user_id: Uuid, post_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.likes.contains_key(&(user_id, post_id)) {
            return Ok(false);
        }
        tables.likes.insert(
            (user_id, post_id),
            Like {
                user_id,
                post_id,
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn delete_like(&self, user_id: Uuid, post_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .tables
            .write()
            .await
            .likes
            .remove(&(user_id, post_id))
            .is_some())
    }

    async fn insert_comment(&self, comment: &Comment) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(parent_id) = comment.parent_id {
            if !tables.comments.contains_key(&parent_id) {
                return Err(StoreError::Conflict("Parent comment does not exist".to_string()));
            }
        }
        tables.comments.insert(comment.id, comment.clone());
        Ok(())
    }

    async fn find_comment(&self, id: Uuid) -> StoreResult<Option<Comment>> {
        Ok(self.tables.read().await.comments.get(&id).cloned())
    }

    async fn comment_view(&self, id: Uuid) -> StoreResult<Option<CommentView>> {
        let tables = self.tables.read().await;
        tables
            .comments
            .get(&id)
            .map(|comment| tables.comment_view(comment))
            .transpose()
    }

    async fn list_comments(
        &self,
        post_id: Uuid,
        page: &PageQuery,
    ) -> StoreResult<(Vec<CommentView>, u64)> {
        let tables = self.tables.read().await;
        let comments = tables.comments_oldest_first(&HashSet::from([post_id]));
        let total = comments.len() as u64;
        let views = paginate(&comments, page)
            .into_iter()
            .map(|comment| tables.comment_view(comment))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((views, total))
    }

    async fn comments_for_posts(&self, post_ids: &[Uuid]) -> StoreResult<Vec<CommentView>> {
        let tables = self.tables.read().await;
        let wanted: HashSet<Uuid> = post_ids.iter().copied().collect();
        tables
            .comments_oldest_first(&wanted)
            .into_iter()
            .map(|comment| tables.comment_view(comment))
            .collect()
    }

    async fn update_comment(&self, id: Uuid, content: String) -> StoreResult<Option<Comment>> {
        let mut tables = self.tables.write().await;
        let Some(comment) = tables.comments.get_mut(&id) else {
            return Ok(None);
        };
        comment.content = content;
        comment.updated_at = Utc::now();
        Ok(Some(comment.clone()))
    }

    async fn delete_comment_tree(&self, id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        if !tables.comments.contains_key(&id) {
            return Ok(0);
        }
        let doomed = tables.comment_subtree(id);
        for comment_id in &doomed {
            tables.comments.remove(comment_id);
        }
        Ok(doomed.len() as u64)
    }

    async fn insert_connection(&self, connection: &Connection) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .connections
            .values()
            .any(|c| c.joins(connection.sender_id, connection.receiver_id))
        {
            return Err(StoreError::Conflict("Connection already exists".to_string()));
        }
        tables.connections.insert(connection.id, connection.clone());
        Ok(())
    }

    async fn resolve_connection(
        &self,
        id: Uuid,
        receiver_id: Uuid,
        status: ConnectionStatus,
    ) -> StoreResult<Option<Connection>> {
        let mut tables = self.tables.write().await;
        let Some(connection) = tables.connections.get_mut(&id) else {
            return Ok(None);
        };
        if connection.receiver_id != receiver_id || connection.status.is_terminal() {
            return Ok(None);
        }
        connection.status = status;
        connection.updated_at = Utc::now();
        Ok(Some(connection.clone()))
    }

    async fn list_incoming(
        &self,
        receiver_id: Uuid,
        page: &PageQuery,
    ) -> StoreResult<(Vec<Connection>, u64)> {
        let tables = self.tables.read().await;
        let mut incoming: Vec<Connection> = tables
            .connections
            .values()
            .filter(|c| c.receiver_id == receiver_id && c.status == ConnectionStatus::Pending)
            .cloned()
            .collect();
        incoming.sort_by_key(|c| (c.created_at, c.id));
        let total = incoming.len() as u64;
        Ok((paginate(&incoming, page), total))
    }

    async fn are_connected(&self, a: Uuid, b: Uuid) -> StoreResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .connections
            .values()
            .any(|c| c.status == ConnectionStatus::Accepted && c.joins(a, b)))
    }

    async fn accepted_counterparts(&self, user_id: Uuid) -> StoreResult<Vec<UserPublic>> {
        let tables = self.tables.read().await;
        let connections: Vec<Connection> = tables
            .connections
            .values()
            .filter(|c| c.involves(user_id))
            .cloned()
            .collect();
        let mut users = graph::counterparts(&connections, user_id, ConnectionStatus::Accepted)
            .into_iter()
            .map(|id| tables.public_user(id))
            .collect::<StoreResult<Vec<_>>>()?;
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn recommendations(&self, user_id: Uuid) -> StoreResult<Vec<Recommendation>> {
        self.tables.read().await.recommend(user_id)
    }
}
