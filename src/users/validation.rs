use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;

/// Field of a user account that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    PasswordHash,
    Email,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Username => "username",
            Field::PasswordHash => "password_hash",
            Field::Email => "email",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    BlankField(Field),

    #[error("username must be {min}-{max} characters, got {len}")]
    UsernameLength { len: usize, min: usize, max: usize },

    #[error("invalid email address: {0}")]
    InvalidEmail(String),
}

impl ValidationError {
    pub fn field(&self) -> Field {
        match self {
            ValidationError::BlankField(field) => *field,
            ValidationError::UsernameLength { .. } => Field::Username,
            ValidationError::InvalidEmail(_) => Field::Email,
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn require(value: &str, field: Field) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    Ok(())
}

/// Username must be non-blank and 3 to 20 characters long.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    require(username, Field::Username)?;

    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::UsernameLength {
            len,
            min: USERNAME_MIN_LEN,
            max: USERNAME_MAX_LEN,
        });
    }
    Ok(())
}

/// Only presence is checked; the hash format belongs to whoever produced it.
pub fn validate_password_hash(password_hash: &str) -> Result<(), ValidationError> {
    require(password_hash, Field::PasswordHash)
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    require(email, Field::Email)?;

    if !is_valid_email(email) {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }
    Ok(())
}
