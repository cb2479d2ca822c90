use crate::domain::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PARTIAL_REGISTRATION_STEP: u8 = 1;

/// Account captured by the first registration step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialUser {
    pub id: String,
    pub email: String,
    pub password: String,
    pub registration_step: u8,
    pub created_at: DateTime<Utc>,
}

impl PartialUser {
    pub fn new(email: String, password: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            password,
            registration_step: PARTIAL_REGISTRATION_STEP,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub auth_provider: String,
    pub username: String,
    pub nationality: String,
    pub team_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Builds the final record from a partial one.
    ///
    /// Email and creation time come from `partial`. A blank `password_hash` in the
    /// completion counts as missing and the partial's stored password is used.
    pub fn from_partial(partial: PartialUser, completion: CompleteRegistration) -> Self {
        let password_hash = completion
            .password_hash
            .filter(|hash| !hash.is_empty())
            .unwrap_or(partial.password);

        Self {
            id: Uuid::new_v4().to_string(),
            email: partial.email,
            password_hash,
            auth_provider: completion.auth_provider,
            username: completion.username,
            nationality: completion.nationality,
            team_name: completion.team_name,
            referral: completion.referral,
            created_at: partial.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePartialUser {
    pub email: String,
    pub password: String,
}

impl CreatePartialUser {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_email(&self.email)?;
        if self.password.is_empty() {
            return Err(DomainError::Validation("password must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRegistration {
    pub email: String,
    pub auth_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub username: String,
    pub nationality: String,
    pub team_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral: Option<String>,
}

impl CompleteRegistration {
    pub fn validate(&self) -> Result<(), DomainError> {
        let required = [
            ("email", &self.email),
            ("authProvider", &self.auth_provider),
            ("username", &self.username),
            ("nationality", &self.nationality),
            ("teamName", &self.team_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(DomainError::Validation(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

/// Shape check only; deliverability is out of scope.
pub fn validate_email(email: &str) -> Result<(), DomainError> {
    let invalid = || DomainError::Validation(format!("invalid email address: {email:?}"));

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    match domain.split_once('.') {
        Some((host, rest)) if !host.is_empty() && !rest.is_empty() && !domain.ends_with('.') => {
            Ok(())
        }
        _ => Err(invalid()),
    }
}
