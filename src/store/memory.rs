//! In-memory system of record with the same semantics as the SQLite backend.

use crate::auth::models::{Role, User};
use crate::auth::password::Password;
use crate::store::{
    expiry_from_now, NewUser, Post, PostStore, PostUpdate, RoleStore, StoreError, StoreResult,
    UserStore, DEFAULT_ROLE,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Default)]
struct Tables {
    roles: Vec<Role>,
    users: HashMap<i64, User>,
    /// token hash -> (user id, unix expiry)
    invitations: HashMap<String, (i64, i64)>,
    posts: HashMap<i64, Post>,
    next_user_id: i64,
    next_post_id: i64,
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with the standard role hierarchy.
    pub fn new() -> Self {
        let roles = [
            ("user", 1, "A user can create posts and comments"),
            ("moderator", 2, "A moderator can update other users posts"),
            ("admin", 3, "An admin can update and delete other users posts"),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (name, level, description))| Role {
            id: i as i64 + 1,
            name: name.to_string(),
            level,
            description: description.to_string(),
        })
        .collect();

        Self {
            tables: RwLock::new(Tables {
                roles,
                next_user_id: 1,
                next_post_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Insert an already-active user directly, bypassing invitations.
    pub fn insert_active_user(
        &self,
        username: &str,
        email: &str,
        password: Password,
        role_name: &str,
    ) -> StoreResult<User> {
        let mut tables = self.tables.write();
        let role = find_role(&tables.roles, role_name)?;
        check_unique(&tables, username, email)?;

        let id = tables.next_user_id;
        tables.next_user_id += 1;
        let user = User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            password,
            created_at: Utc::now().to_rfc3339(),
            is_active: true,
            role,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }
}

fn find_role(roles: &[Role], name: &str) -> StoreResult<Role> {
    roles
        .iter()
        .find(|r| r.name == name)
        .cloned()
        .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("unknown role {name}")))
}

fn check_unique(tables: &Tables, username: &str, email: &str) -> StoreResult<()> {
    for existing in tables.users.values() {
        if existing.email == email {
            return Err(StoreError::DuplicateEmail);
        }
        if existing.username == username {
            return Err(StoreError::DuplicateUsername);
        }
    }
    Ok(())
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let tables = self.tables.read();
        Ok(tables.users.get(&id).filter(|u| u.is_active).cloned())
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read();
        Ok(tables
            .users
            .values()
            .find(|u| u.is_active && u.email == email)
            .cloned())
    }

    async fn create_and_invite(
        &self,
        user: NewUser,
        token_hash: &str,
        invitation_exp: Duration,
    ) -> StoreResult<User> {
        let mut tables = self.tables.write();
        let role = find_role(&tables.roles, user.role.as_deref().unwrap_or(DEFAULT_ROLE))?;
        check_unique(&tables, &user.username, &user.email)?;

        let id = tables.next_user_id;
        tables.next_user_id += 1;
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password: Password::from_hash(user.password_hash),
            created_at: Utc::now().to_rfc3339(),
            is_active: false,
            role,
        };
        tables.users.insert(id, created.clone());

        let expiry = expiry_from_now(invitation_exp);
        tables
            .invitations
            .insert(token_hash.to_string(), (id, expiry));
        Ok(created)
    }

    async fn activate(&self, token_hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let now = Utc::now().timestamp();
        let user_id = match tables.invitations.get(token_hash) {
            Some(&(user_id, expiry)) if expiry > now => user_id,
            _ => return Err(StoreError::NotFound),
        };

        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound)?;
        user.is_active = true;
        tables.invitations.retain(|_, (uid, _)| *uid != user_id);
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables.users.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        tables.invitations.retain(|_, (uid, _)| *uid != id);
        tables.posts.retain(|_, p| p.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn get_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let tables = self.tables.read();
        Ok(tables.roles.iter().find(|r| r.name == name).cloned())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create(
        &self,
        user_id: i64,
        title: &str,
        content: &str,
        tags: &[String],
    ) -> StoreResult<Post> {
        let mut tables = self.tables.write();
        let id = tables.next_post_id;
        tables.next_post_id += 1;

        let now = Utc::now().to_rfc3339();
        let post = Post {
            id,
            title: title.to_string(),
            content: content.to_string(),
            user_id,
            tags: tags.to_vec(),
            created_at: now.clone(),
            updated_at: now,
            version: 0,
        };
        tables.posts.insert(id, post.clone());
        Ok(post)
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        Ok(self.tables.read().posts.get(&id).cloned())
    }

    async fn update(&self, id: i64, update: &PostUpdate) -> StoreResult<Post> {
        let mut tables = self.tables.write();
        let post = tables.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(title) = &update.title {
            post.title = title.clone();
        }
        if let Some(content) = &update.content {
            post.content = content.clone();
        }
        post.updated_at = Utc::now().to_rfc3339();
        post.version += 1;
        Ok(post.clone())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.tables
            .write()
            .posts
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
