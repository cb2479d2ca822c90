use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("User already registered with this email")]
    AlreadyRegistered,
    #[error("Partial user not found")]
    PartialUserNotFound,
    #[error("Email is already registered")]
    EmailTaken,
    /// Raised by storage when a write would break email uniqueness.
    #[error("Duplicate email: {0}")]
    DuplicateEmail(String),
    #[error("Validation error: {0}")]
    Validation(String),
}
