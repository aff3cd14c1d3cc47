mod memory;
mod postgres;
mod record;
mod repo;
mod repo_types;
pub mod validation;

pub use memory::InMemoryUserStore;
pub use postgres::PgUserStore;
pub use record::UserRecord;
pub use repo::{unique_key, ConflictError, StoreError, UniqueField, UserStore};
pub use repo_types::UserRow;
pub use validation::{Field, ValidationError};
