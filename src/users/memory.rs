use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::record::UserRecord;
use super::repo::{unique_key, ConflictError, StoreError, UserStore};

#[derive(Debug)]
struct Inner {
    next_id: i64,
    users: BTreeMap<i64, UserRecord>,
    by_username: HashMap<String, i64>,
    by_email: HashMap<String, i64>,
}

impl Inner {
    /// Fails if `user`'s username or email belongs to someone other than `owner`.
    fn check_unique(&self, user: &UserRecord, owner: Option<i64>) -> Result<(), ConflictError> {
        let taken_by_other = |index: &HashMap<String, i64>, value: &str| {
            index
                .get(&unique_key(value))
                .is_some_and(|id| Some(*id) != owner)
        };

        if taken_by_other(&self.by_username, user.username()) {
            return Err(ConflictError::username(user.username()));
        }
        if taken_by_other(&self.by_email, user.email()) {
            return Err(ConflictError::email(user.email()));
        }
        Ok(())
    }

    fn index(&mut self, id: i64, user: &UserRecord) {
        self.by_username.insert(unique_key(user.username()), id);
        self.by_email.insert(unique_key(user.email()), id);
    }

    fn unindex(&mut self, user: &UserRecord) {
        self.by_username.remove(&unique_key(user.username()));
        self.by_email.remove(&unique_key(user.email()));
    }
}

/// Process-local [`UserStore`] backed by maps.
///
/// A single lock covers the records, both uniqueness indexes and the id
/// counter, so writes are serialized. Ids start at 1 and are not reused.
#[derive(Debug)]
pub struct InMemoryUserStore {
    inner: RwLock<Inner>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                users: BTreeMap::new(),
                by_username: HashMap::new(),
                by_email: HashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    #[instrument(skip_all, fields(username = %user.username()))]
    async fn insert(&self, mut user: UserRecord) -> Result<UserRecord, StoreError> {
        if user.is_persisted() {
            return Err(StoreError::AlreadyPersisted);
        }

        let mut inner = self.inner.write().await;
        if let Err(e) = inner.check_unique(&user, None) {
            warn!(field = %e.field, "user insert conflict");
            return Err(e.into());
        }

        let id = inner.next_id;
        inner.next_id += 1;
        user.assign_id(id);
        inner.index(id, &user);
        inner.users.insert(id, user.clone());

        info!(user_id = id, "user stored");
        Ok(user)
    }

    #[instrument(skip_all, fields(user_id = ?user.id()))]
    async fn update(&self, user: &UserRecord) -> Result<(), StoreError> {
        let id = user.id().ok_or(StoreError::NotPersisted)?;

        let mut inner = self.inner.write().await;
        let previous = inner.users.get(&id).cloned().ok_or(StoreError::NotFound(id))?;
        if let Err(e) = inner.check_unique(user, Some(id)) {
            warn!(field = %e.field, "user update conflict");
            return Err(e.into());
        }

        inner.unindex(&previous);
        inner.index(id, user);
        inner.users.insert(id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_username
            .get(&unique_key(username))
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_email
            .get(&unique_key(email))
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.users.remove(&id) {
            Some(user) => {
                inner.unindex(&user);
                info!(user_id = id, "user deleted");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.users.len())
    }
}
