use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use super::record::UserRecord;

/// Column that must be unique across all stored users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::Username => f.write_str("username"),
            UniqueField::Email => f.write_str("email"),
        }
    }
}

/// A write would give two users the same username or email.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} '{value}' is already taken")]
pub struct ConflictError {
    pub field: UniqueField,
    pub value: String,
}

impl ConflictError {
    pub fn username(value: impl Into<String>) -> Self {
        Self {
            field: UniqueField::Username,
            value: value.into(),
        }
    }

    pub fn email(value: impl Into<String>) -> Self {
        Self {
            field: UniqueField::Email,
            value: value.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("user {0} not found")]
    NotFound(i64),

    #[error("user has not been stored yet")]
    NotPersisted,

    #[error("user is already stored")]
    AlreadyPersisted,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Uniqueness key: username and email compare ASCII case-insensitively.
///
/// Only `A-Z` fold, matching `lower(.. COLLATE "C")` in the Postgres indexes,
/// so every store agrees on which values collide.
pub fn unique_key(value: &str) -> String {
    value.to_ascii_lowercase()
}

/// Storage for [`UserRecord`]s.
///
/// Implementations own the cross-record invariants: they assign the id on
/// first insert, and reject any write that would make a username or email
/// collide with another user's (compared with [`unique_key`]). The check and
/// the write happen atomically.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Stores a new user and returns it with its assigned id.
    async fn insert(&self, user: UserRecord) -> Result<UserRecord, StoreError>;

    /// Writes every field of an already stored user.
    async fn update(&self, user: &UserRecord) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Returns `true` if a user was removed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}
