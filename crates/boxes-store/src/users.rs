use boxes_core::time::format_timestamp;
use boxes_core::{Actor, UserId};
use chrono::Utc;
use rusqlite::OptionalExtension;
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::parse_ts;
use crate::token::{hash_token, issue_token};

#[derive(Clone, Debug)]
pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub is_staff: bool,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<&UserRow> for Actor {
    fn from(user: &UserRow) -> Self {
        Actor {
            id: user.id,
            username: user.username.clone(),
            is_staff: user.is_staff,
        }
    }
}

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a user and issue its API token. The token is returned once and
    /// only its hash is stored.
    #[instrument(skip(self))]
    pub fn create(&self, username: &str, is_staff: bool) -> Result<(UserRow, SecretString), StoreError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::InvalidInput("username must not be empty".into()));
        }
        let token = issue_token();
        let now = Utc::now();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, is_staff, token_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    username,
                    is_staff,
                    hash_token(token.expose_secret()),
                    format_timestamp(now),
                ],
            )
            .map_err(|e| match StoreError::from(e) {
                StoreError::Conflict(_) => StoreError::Conflict(format!("user {username} already exists")),
                other => other,
            })?;

            let user = UserRow {
                id: UserId::from_raw(conn.last_insert_rowid()),
                username: username.to_string(),
                is_staff,
                created_at: now,
            };
            Ok((user, token))
        })
    }

    /// Resolve a presented token to its user, if any.
    pub fn find_by_token(&self, token: &str) -> Result<Option<UserRow>, StoreError> {
        let hash = hash_token(token);
        self.query_one("SELECT id, username, is_staff, created_at FROM users WHERE token_hash = ?1", &hash)
    }

    pub fn list(&self) -> Result<Vec<UserRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, username, is_staff, created_at FROM users ORDER BY id")?;
            let raw = stmt
                .query_map([], raw_user)?
                .collect::<Result<Vec<_>, _>>()?;
            raw.into_iter().map(RawUser::into_row).collect()
        })
    }

    fn query_one(&self, sql: &str, arg: &str) -> Result<Option<UserRow>, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(sql, [arg], raw_user)
                .optional()?
                .map(RawUser::into_row)
                .transpose()
        })
    }
}

struct RawUser {
    id: i64,
    username: String,
    is_staff: bool,
    created_at: String,
}

fn raw_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
    Ok(RawUser {
        id: row.get(0)?,
        username: row.get(1)?,
        is_staff: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl RawUser {
    fn into_row(self) -> Result<UserRow, StoreError> {
        Ok(UserRow {
            id: UserId::from_raw(self.id),
            username: self.username,
            is_staff: self.is_staff,
            created_at: parse_ts(&self.created_at, "users", "created_at")?,
        })
    }
}
