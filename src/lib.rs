//! User accounts for the password-practice application.
//!
//! [`users::UserRecord`] holds one account and checks its own field
//! constraints. Cross-record rules (id assignment, unique usernames and
//! emails) belong to a [`users::UserStore`].

pub mod config;
pub mod db;
pub mod telemetry;
pub mod users;

pub use users::{ConflictError, StoreError, UserRecord, UserStore, ValidationError};
