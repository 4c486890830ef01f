//! SQLite-backed system of record
//!
//! One connection behind a mutex; every call runs on the blocking pool and is
//! bounded by the configured query timeout.

use crate::auth::models::{Role, User};
use crate::auth::password::Password;
use crate::store::{
    expiry_from_now, with_deadline, NewUser, Post, PostStore, PostUpdate, RoleStore, StoreError,
    StoreResult, UserStore, DEFAULT_ROLE,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS roles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL,
    level INTEGER NOT NULL DEFAULT 0,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL,
    created_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 0,
    role_id INTEGER NOT NULL REFERENCES roles(id)
);

CREATE TABLE IF NOT EXISTS user_invitations (
    token TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expiry INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_posts_user ON posts(user_id);

INSERT OR IGNORE INTO roles (name, level, description) VALUES
    ('user', 1, 'A user can create posts and comments'),
    ('moderator', 2, 'A moderator can update other users posts'),
    ('admin', 3, 'An admin can update and delete other users posts');
"#;

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password, u.created_at, u.is_active, \
                            r.id, r.name, r.level, r.description";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open (or create) the database and apply the schema. `":memory:"` works.
    pub fn new(db_path: &str, query_timeout: Duration) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path))?;
        conn.busy_timeout(query_timeout)
            .context("Failed to set busy timeout")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        info!("📊 System of record initialized at: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            query_timeout,
        })
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        with_deadline(self.query_timeout, async move {
            tokio::task::spawn_blocking(move || {
                let mut conn = conn.lock();
                f(&mut conn)
            })
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("blocking task failed: {e}")))?
        })
        .await
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: Password::from_hash(row.get::<_, String>(3)?),
        created_at: row.get(4)?,
        is_active: row.get(5)?,
        role: Role {
            id: row.get(6)?,
            name: row.get(7)?,
            level: row.get(8)?,
            description: row.get(9)?,
        },
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<(Post, String)> {
    let tags_json: String = row.get(4)?;
    Ok((
        Post {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            user_id: row.get(3)?,
            tags: Vec::new(),
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            version: row.get(7)?,
        },
        tags_json,
    ))
}

fn decode_tags((mut post, tags_json): (Post, String)) -> StoreResult<Post> {
    post.tags = serde_json::from_str(&tags_json)
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("corrupt tags on post {}: {e}", post.id)))?;
    Ok(post)
}

fn select_post(conn: &Connection, id: i64) -> StoreResult<Option<Post>> {
    conn.query_row(
        "SELECT id, title, content, user_id, tags, created_at, updated_at, version
         FROM posts WHERE id = ?1",
        params![id],
        post_from_row,
    )
    .optional()?
    .map(decode_tags)
    .transpose()
}

/// Turn UNIQUE violations on `users` into the matching domain error.
fn map_user_insert_error(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(e, Some(msg)) = &err {
        if e.code == ErrorCode::ConstraintViolation {
            if msg.contains("users.email") {
                return StoreError::DuplicateEmail;
            }
            if msg.contains("users.username") {
                return StoreError::DuplicateUsername;
            }
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON u.role_id = r.id
                 WHERE u.id = ?1 AND u.is_active = 1"
            );
            Ok(conn.query_row(&sql, params![id], user_from_row).optional()?)
        })
        .await
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u JOIN roles r ON u.role_id = r.id
                 WHERE u.email = ?1 AND u.is_active = 1"
            );
            Ok(conn.query_row(&sql, params![email], user_from_row).optional()?)
        })
        .await
    }

    async fn create_and_invite(
        &self,
        user: NewUser,
        token_hash: &str,
        invitation_exp: Duration,
    ) -> StoreResult<User> {
        let token_hash = token_hash.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let role_name = user.role.as_deref().unwrap_or(DEFAULT_ROLE);

            let role = tx
                .query_row(
                    "SELECT id, name, level, description FROM roles WHERE name = ?1",
                    params![role_name],
                    |row| {
                        Ok(Role {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            level: row.get(2)?,
                            description: row.get(3)?,
                        })
                    },
                )
                .optional()?
                .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("unknown role {role_name}")))?;

            let created_at = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO users (username, email, password, created_at, is_active, role_id)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    user.username,
                    user.email,
                    user.password_hash,
                    created_at,
                    role.id
                ],
            )
            .map_err(map_user_insert_error)?;
            let id = tx.last_insert_rowid();

            let expiry = expiry_from_now(invitation_exp);
            tx.execute(
                "INSERT INTO user_invitations (token, user_id, expiry) VALUES (?1, ?2, ?3)",
                params![token_hash, id, expiry],
            )?;
            tx.commit()?;

            debug!(user_id = id, "Created user with pending invitation");

            Ok(User {
                id,
                username: user.username,
                email: user.email,
                password: Password::from_hash(user.password_hash),
                created_at,
                is_active: false,
                role,
            })
        })
        .await
    }

    async fn activate(&self, token_hash: &str) -> StoreResult<()> {
        let token_hash = token_hash.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let user_id: i64 = tx
                .query_row(
                    "SELECT u.id FROM users u
                     JOIN user_invitations ui ON ui.user_id = u.id
                     WHERE ui.token = ?1 AND ui.expiry > ?2",
                    params![token_hash, Utc::now().timestamp()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;

            tx.execute(
                "UPDATE users SET is_active = 1 WHERE id = ?1",
                params![user_id],
            )?;
            tx.execute(
                "DELETE FROM user_invitations WHERE user_id = ?1",
                params![user_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM user_invitations WHERE user_id = ?1",
                params![id],
            )?;
            let rows = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
            if rows == 0 {
                return Err(StoreError::NotFound);
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl RoleStore for SqliteStore {
    async fn get_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let name = name.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, level, description FROM roles WHERE name = ?1",
                    params![name],
                    |row| {
                        Ok(Role {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            level: row.get(2)?,
                            description: row.get(3)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn create(
        &self,
        user_id: i64,
        title: &str,
        content: &str,
        tags: &[String],
    ) -> StoreResult<Post> {
        let title = title.to_string();
        let content = content.to_string();
        let tags = tags.to_vec();
        self.run(move |conn| {
            let tags_json = serde_json::to_string(&tags).map_err(|e| StoreError::Backend(e.into()))?;
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO posts (title, content, user_id, tags, created_at, updated_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, 0)",
                params![title, content, user_id, tags_json, now],
            )?;
            let id = conn.last_insert_rowid();
            Ok(Post {
                id,
                title,
                content,
                user_id,
                tags,
                created_at: now.clone(),
                updated_at: now,
                version: 0,
            })
        })
        .await
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        self.run(move |conn| select_post(conn, id)).await
    }

    async fn update(&self, id: i64, update: &PostUpdate) -> StoreResult<Post> {
        let update = update.clone();
        self.run(move |conn| {
            let rows = conn.execute(
                "UPDATE posts
                 SET title = COALESCE(?1, title),
                     content = COALESCE(?2, content),
                     updated_at = ?3,
                     version = version + 1
                 WHERE id = ?4",
                params![update.title, update.content, Utc::now().to_rfc3339(), id],
            )?;
            if rows == 0 {
                return Err(StoreError::NotFound);
            }
            select_post(conn, id)?.ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.run(move |conn| {
            let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
            if rows == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }
}
