use std::fmt;

use serde::Serialize;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tracing::debug;

use super::validation::{
    validate_email, validate_password_hash, validate_username, ValidationError,
};

/// A user account of the password-practice application.
///
/// Field constraints are checked on construction and by every mutator, so a
/// `UserRecord` is always valid on its own. Uniqueness of `username` and
/// `email` is a property of a set of records and is enforced by the
/// [`UserStore`](super::repo::UserStore) holding them.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    id: Option<i64>,
    username: String,
    #[serde(skip_serializing)]
    password_hash: String, // already hashed, never plaintext
    email: String,
    enabled: bool,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    password_changed_at: OffsetDateTime,
}

impl UserRecord {
    /// Creates an enabled, not yet persisted account.
    ///
    /// `created_at` and `password_changed_at` are set from the same clock
    /// reading, so they are equal on a fresh record.
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let username = username.into();
        let password_hash = password_hash.into();
        let email = email.into();

        validate_username(&username)?;
        validate_password_hash(&password_hash)?;
        validate_email(&email)?;

        let now = now_micros();
        Ok(Self {
            id: None,
            username,
            password_hash,
            email,
            enabled: true,
            created_at: now,
            password_changed_at: now,
        })
    }

    /// Rebuilds a record from stored columns without re-validating them.
    pub(crate) fn restore(
        id: i64,
        username: String,
        password_hash: String,
        email: String,
        enabled: bool,
        created_at: OffsetDateTime,
        password_changed_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: Some(id),
            username,
            password_hash,
            email,
            enabled,
            created_at,
            password_changed_at,
        }
    }

    /// Called by a store on first insert. The id never changes afterwards.
    pub(crate) fn assign_id(&mut self, id: i64) {
        debug_assert!(self.id.is_none(), "id already assigned");
        if self.id.is_none() {
            self.id = Some(id);
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn password_changed_at(&self) -> OffsetDateTime {
        self.password_changed_at
    }

    pub fn set_username(&mut self, username: impl Into<String>) -> Result<(), ValidationError> {
        let username = username.into();
        validate_username(&username)?;
        debug!(user_id = ?self.id, field = "username", "user updated");
        self.username = username;
        Ok(())
    }

    /// Replaces the stored hash and refreshes `password_changed_at`.
    ///
    /// The timestamp is set to the current instant, but never earlier than its
    /// previous value, so it only moves forward. A rejected hash leaves both
    /// the hash and the timestamp unchanged.
    pub fn set_password_hash(
        &mut self,
        password_hash: impl Into<String>,
    ) -> Result<(), ValidationError> {
        let password_hash = password_hash.into();
        validate_password_hash(&password_hash)?;

        self.password_hash = password_hash;
        self.password_changed_at = now_micros().max(self.password_changed_at);
        debug!(user_id = ?self.id, field = "password_hash", "user updated");
        Ok(())
    }

    pub fn set_email(&mut self, email: impl Into<String>) -> Result<(), ValidationError> {
        let email = email.into();
        validate_email(&email)?;
        debug!(user_id = ?self.id, field = "email", "user updated");
        self.email = email;
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        debug!(user_id = ?self.id, field = "enabled", enabled, "user updated");
        self.enabled = enabled;
    }
}

/// Current UTC instant at microsecond precision, the resolution of `TIMESTAMPTZ`.
fn now_micros() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - Duration::nanoseconds(i64::from(now.nanosecond() % 1_000))
}

fn fmt_instant(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

// Neither rendering includes the password hash or the password-change time.
impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User{{id=")?;
        match self.id {
            Some(id) => write!(f, "{id}")?,
            None => write!(f, "null")?,
        }
        write!(
            f,
            ", username='{}', email='{}', enabled={}, createdAt={}}}",
            self.username,
            self.email,
            self.enabled,
            fmt_instant(self.created_at)
        )
    }
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("enabled", &self.enabled)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::validation::Field;

    const HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaA";

    fn sample() -> UserRecord {
        UserRecord::new("alice", HASH, "alice@example.com").expect("valid user")
    }

    #[test]
    fn new_user_defaults() {
        let user = sample();
        assert_eq!(user.id(), None);
        assert!(!user.is_persisted());
        assert_eq!(user.username(), "alice");
        assert_eq!(user.password_hash(), HASH);
        assert_eq!(user.email(), "alice@example.com");
        assert!(user.enabled());
        assert_eq!(user.created_at(), user.password_changed_at());
    }

    #[test]
    fn new_rejects_invalid_fields() {
        let err = UserRecord::new("al", HASH, "alice@example.com").unwrap_err();
        assert_eq!(err.field(), Field::Username);

        let err = UserRecord::new("alice", " ", "alice@example.com").unwrap_err();
        assert_eq!(err, ValidationError::BlankField(Field::PasswordHash));

        let err = UserRecord::new("alice", HASH, "alice.example.com").unwrap_err();
        assert_eq!(err.field(), Field::Email);

        let err = UserRecord::new("", "", "").unwrap_err();
        assert_eq!(err, ValidationError::BlankField(Field::Username));
    }

    #[test]
    fn username_boundaries_on_construction() {
        assert!(UserRecord::new("abc", HASH, "a@example.com").is_ok());
        assert!(UserRecord::new("a".repeat(20), HASH, "a@example.com").is_ok());
        assert!(UserRecord::new("ab", HASH, "a@example.com").is_err());
        assert!(UserRecord::new("a".repeat(21), HASH, "a@example.com").is_err());
    }

    #[test]
    fn set_password_hash_advances_timestamp_only() {
        let mut user = sample();
        let created = user.created_at();
        let before = user.password_changed_at();

        std::thread::sleep(std::time::Duration::from_millis(5));
        user.set_password_hash("$argon2id$new").expect("valid hash");

        assert_eq!(user.password_hash(), "$argon2id$new");
        assert!(user.password_changed_at() > before);
        assert_eq!(user.created_at(), created);
        assert!(user.created_at() <= user.password_changed_at());
    }

    #[test]
    fn timestamps_have_microsecond_precision() {
        for _ in 0..50 {
            let mut user = sample();
            assert_eq!(user.created_at().nanosecond() % 1_000, 0);
            assert_eq!(user.password_changed_at().nanosecond() % 1_000, 0);

            user.set_password_hash("$argon2id$rotated").expect("valid hash");
            assert_eq!(user.password_changed_at().nanosecond() % 1_000, 0);
            assert!(user.created_at() <= user.password_changed_at());
        }
    }

    #[test]
    fn set_password_hash_never_moves_backwards() {
        let mut user = sample();
        let future = user.created_at() + Duration::hours(1);
        user.password_changed_at = future;

        user.set_password_hash("$argon2id$other").expect("valid hash");
        assert_eq!(user.password_changed_at(), future);
    }

    #[test]
    fn rejected_password_hash_leaves_record_untouched() {
        let mut user = sample();
        let before = user.clone();
        assert!(user.set_password_hash("").is_err());
        assert_eq!(user, before);
    }

    #[test]
    fn set_username_and_email_revalidate() {
        let mut user = sample();
        let changed_at = user.password_changed_at();

        user.set_username("bob_the_builder").expect("valid username");
        assert_eq!(user.username(), "bob_the_builder");
        assert!(user.set_username("bo").is_err());
        assert!(user.set_username("  ").is_err());
        assert_eq!(user.username(), "bob_the_builder");

        user.set_email("bob@example.org").expect("valid email");
        assert_eq!(user.email(), "bob@example.org");
        assert!(user.set_email("bob@").is_err());
        assert_eq!(user.email(), "bob@example.org");

        assert_eq!(user.password_changed_at(), changed_at);
    }

    #[test]
    fn enabled_toggles_independently() {
        let mut user = sample();
        let before = user.clone();

        user.set_enabled(false);
        assert!(!user.enabled());
        assert_eq!(user.username(), before.username());
        assert_eq!(user.password_hash(), before.password_hash());
        assert_eq!(user.email(), before.email());
        assert_eq!(user.created_at(), before.created_at());
        assert_eq!(user.password_changed_at(), before.password_changed_at());

        user.set_enabled(true);
        assert_eq!(user, before);
    }

    #[test]
    fn assign_id_is_fixed_once_set() {
        let mut user = sample();
        user.assign_id(7);
        assert_eq!(user.id(), Some(7));
        assert!(user.is_persisted());
    }

    #[test]
    fn display_hides_password_material() {
        let mut user = sample();
        let rendered = user.to_string();
        assert!(rendered.starts_with("User{id=null, username='alice', email='alice@example.com', enabled=true, createdAt="));
        assert!(!rendered.contains(HASH));
        assert!(!rendered.contains("passwordChangedAt"));

        user.assign_id(42);
        assert!(user.to_string().starts_with("User{id=42,"));
    }

    #[test]
    fn renderings_never_contain_hash() {
        let hashes = [
            "$2b$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW",
            "$argon2id$v=19$m=65536,t=3,p=4$ZHVtbXlzYWx0$ZHVtbXloYXNo",
            "pbkdf2_sha256$600000$salt$c2VjcmV0LWRpZ2VzdA==",
            "{SSHA}qUqP5cyxm6YcTAhz05Hph5gvu9M=",
        ];
        for hash in hashes {
            let mut user = UserRecord::new("dave", hash, "dave@example.com").unwrap();
            user.set_password_hash(hash).unwrap();
            assert!(!user.to_string().contains(hash), "Display leaked {hash}");
            assert!(!format!("{user:?}").contains(hash), "Debug leaked {hash}");
            assert!(!format!("{user:#?}").contains(hash), "pretty Debug leaked {hash}");
        }
    }

    #[test]
    fn debug_hides_password_material() {
        let user = sample();
        let rendered = format!("{user:?}");
        assert!(rendered.contains("alice@example.com"));
        assert!(!rendered.contains(HASH));
        assert!(!rendered.contains("password"));
    }

    #[test]
    fn serialization_skips_password_hash() {
        let user = sample();
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["enabled"], true);
        assert!(json.get("password_hash").is_none());
        assert!(!json.to_string().contains(HASH));
    }
}
