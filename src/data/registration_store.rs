use crate::domain::error::DomainError;
use crate::domain::repository::{PartialUserRepository, RegistrationRepository, UserRepository};
use crate::domain::user::{PartialUser, User};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace, warn};

#[derive(Default)]
struct Tables {
    partial_users: HashMap<String, PartialUser>,
    users: HashMap<String, User>,
}

/// Both collections live behind a single lock so promotion is atomic.
#[derive(Clone)]
pub struct InMemoryRegistrationStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }
}

impl Default for InMemoryRegistrationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PartialUserRepository for InMemoryRegistrationStore {
    #[instrument(skip(self, partial), fields(partial_id = %partial.id, email = %partial.email))]
    async fn insert_partial_user(&self, partial: PartialUser) -> Result<()> {
        trace!("Acquiring write lock for registration storage");
        let mut tables = self.tables.write().await;
        match tables.partial_users.entry(partial.email.clone()) {
            Entry::Occupied(_) => {
                warn!(email = %partial.email, "Partial user already stored for email");
                Err(DomainError::DuplicateEmail(partial.email).into())
            }
            Entry::Vacant(slot) => {
                debug!(
                    partial_id = %partial.id,
                    email = %partial.email,
                    "Partial user saved to memory storage"
                );
                slot.insert(partial);
                Ok(())
            }
        }
    }

    #[instrument(skip(self), fields(email = email))]
    async fn find_partial_user_by_email(&self, email: &str) -> Result<Option<PartialUser>> {
        trace!("Acquiring read lock for registration storage");
        let tables = self.tables.read().await;
        let partial = tables.partial_users.get(email).cloned();
        match &partial {
            Some(p) => debug!(partial_id = %p.id, email = %p.email, "Partial user found in storage"),
            None => trace!(email = email, "Partial user not found in storage"),
        }
        Ok(partial)
    }

    #[instrument(skip(self), fields(email = email))]
    async fn delete_partial_user_by_email(&self, email: &str) -> Result<()> {
        trace!("Acquiring write lock for registration storage");
        let mut tables = self.tables.write().await;
        match tables.partial_users.remove(email) {
            Some(p) => debug!(partial_id = %p.id, email = email, "Partial user removed"),
            None => trace!(email = email, "No partial user to remove"),
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryRegistrationStore {
    #[instrument(skip(self), fields(email = email))]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        trace!("Acquiring read lock for registration storage");
        let tables = self.tables.read().await;
        let user = tables.users.get(email).cloned();
        match &user {
            Some(u) => debug!(user_id = %u.id, email = %u.email, "User found in storage"),
            None => trace!(email = email, "User not found in storage"),
        }
        Ok(user)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id, email = %user.email))]
    async fn insert_user(&self, user: User) -> Result<()> {
        trace!("Acquiring write lock for registration storage");
        let mut tables = self.tables.write().await;
        insert_unique_user(&mut tables, user)
    }
}

#[async_trait]
impl RegistrationRepository for InMemoryRegistrationStore {
    #[instrument(skip(self, user), fields(user_id = %user.id, email = %user.email))]
    async fn promote_partial_user(&self, user: User) -> Result<()> {
        trace!("Acquiring write lock for registration storage");
        let mut tables = self.tables.write().await;
        let email = user.email.clone();
        insert_unique_user(&mut tables, user)?;
        tables.partial_users.remove(&email);
        debug!(email = %email, "Partial user promoted");
        Ok(())
    }
}

fn insert_unique_user(tables: &mut Tables, user: User) -> Result<()> {
    match tables.users.entry(user.email.clone()) {
        Entry::Occupied(_) => {
            warn!(email = %user.email, "User already stored for email");
            Err(DomainError::DuplicateEmail(user.email).into())
        }
        Entry::Vacant(slot) => {
            debug!(user_id = %user.id, email = %user.email, "User saved to memory storage");
            slot.insert(user);
            Ok(())
        }
    }
}
