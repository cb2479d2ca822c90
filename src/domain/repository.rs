use crate::domain::user::{PartialUser, User};
use anyhow::Result;
use async_trait::async_trait;

/// In-progress registrations, keyed by email.
#[async_trait]
pub trait PartialUserRepository: Send + Sync {
    /// Fails with `DomainError::DuplicateEmail` if a partial record already exists.
    async fn insert_partial_user(&self, partial: PartialUser) -> Result<()>;
    async fn find_partial_user_by_email(&self, email: &str) -> Result<Option<PartialUser>>;
    /// Removing an absent record is not an error.
    async fn delete_partial_user_by_email(&self, email: &str) -> Result<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Fails with `DomainError::DuplicateEmail` if a user already exists.
    async fn insert_user(&self, user: User) -> Result<()>;
}

#[async_trait]
pub trait RegistrationRepository: PartialUserRepository + UserRepository {
    /// Stores `user` and drops the partial record for the same email as one unit.
    ///
    /// Nothing changes when a user with that email already exists; the call then
    /// fails with `DomainError::DuplicateEmail`.
    async fn promote_partial_user(&self, user: User) -> Result<()>;
}
