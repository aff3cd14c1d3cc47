use sqlx::FromRow;
use time::OffsetDateTime;

use super::record::UserRecord;

/// Row of the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub enabled: bool,
    pub created_at: OffsetDateTime,
    pub password_changed_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        UserRecord::restore(
            row.id,
            row.username,
            row.password_hash,
            row.email,
            row.enabled,
            row.created_at,
            row.password_changed_at,
        )
    }
}
