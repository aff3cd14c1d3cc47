use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info, instrument, warn};

use super::record::UserRecord;
use super::repo::{ConflictError, StoreError, UniqueField, UserStore};
use super::repo_types::UserRow;

const USERNAME_KEY: &str = "users_username_lower_key";
const EMAIL_KEY: &str = "users_email_lower_key";

/// [`UserStore`] on the `users` table (see `migrations/0001_create_users.sql`).
///
/// Uniqueness is enforced by the case-insensitive unique indexes, so the
/// conflict surfaces when the statement commits.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Maps a violated unique index back to the field it guards.
///
/// Indexes other than ours are matched on the column name they mention;
/// anything else counts as a username conflict.
pub(crate) fn conflict_field(constraint: Option<&str>) -> UniqueField {
    match constraint {
        Some(USERNAME_KEY) => UniqueField::Username,
        Some(EMAIL_KEY) => UniqueField::Email,
        Some(name) if name.contains("email") => UniqueField::Email,
        _ => UniqueField::Username,
    }
}

fn map_write_error(e: sqlx::Error, user: &UserRecord) -> StoreError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            let conflict = match conflict_field(db_err.constraint()) {
                UniqueField::Email => ConflictError::email(user.email()),
                UniqueField::Username => ConflictError::username(user.username()),
            };
            warn!(field = %conflict.field, "user write conflict");
            return conflict.into();
        }
    }
    error!(error = %e, "user write failed");
    StoreError::Database(e)
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip_all, fields(username = %user.username()))]
    async fn insert(&self, mut user: UserRecord) -> Result<UserRecord, StoreError> {
        if user.is_persisted() {
            return Err(StoreError::AlreadyPersisted);
        }

        let (id,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO users (username, password_hash, email, enabled, created_at, password_changed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(user.username())
        .bind(user.password_hash())
        .bind(user.email())
        .bind(user.enabled())
        .bind(user.created_at())
        .bind(user.password_changed_at())
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, &user))?;

        user.assign_id(id);
        info!(user_id = id, "user stored");
        Ok(user)
    }

    #[instrument(skip_all, fields(user_id = ?user.id()))]
    async fn update(&self, user: &UserRecord) -> Result<(), StoreError> {
        let id = user.id().ok_or(StoreError::NotPersisted)?;

        let result = sqlx::query(
            r#"
            UPDATE users
               SET username = $2, password_hash = $3, email = $4,
                   enabled = $5, password_changed_at = $6
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(user.username())
        .bind(user.password_hash())
        .bind(user.email())
        .bind(user.enabled())
        .bind(user.password_changed_at())
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, user))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, password_hash, email, enabled, created_at, password_changed_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(UserRecord::from))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, password_hash, email, enabled, created_at, password_changed_at
            FROM users
            WHERE lower(username COLLATE "C") = lower($1 COLLATE "C")
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(UserRecord::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, password_hash, email, enabled, created_at, password_changed_at
            FROM users
            WHERE lower(email COLLATE "C") = lower($1 COLLATE "C")
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(UserRecord::from))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(user_id = id, "user deleted");
        }
        Ok(deleted)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        Ok(count as usize)
    }
}
