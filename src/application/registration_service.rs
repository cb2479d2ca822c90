use crate::domain::error::DomainError;
use crate::domain::repository::RegistrationRepository;
use crate::domain::user::{
    CompleteRegistration, CreatePartialUser, PartialUser, User, validate_email,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, trace, warn};

pub struct RegistrationService<R: RegistrationRepository> {
    repository: Arc<R>,
}

impl<R: RegistrationRepository> RegistrationService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Rejects malformed emails and emails that already have a user or partial record.
    #[instrument(skip(self), fields(email = email))]
    pub async fn ensure_email_available(&self, email: &str) -> Result<()> {
        trace!("Checking email availability");
        validate_email(email)?;

        if self.repository.find_user_by_email(email).await?.is_some() {
            warn!(email = email, "Email belongs to a registered user");
            return Err(DomainError::EmailTaken.into());
        }
        if self
            .repository
            .find_partial_user_by_email(email)
            .await?
            .is_some()
        {
            warn!(email = email, "Email has a pending registration");
            return Err(DomainError::EmailTaken.into());
        }
        Ok(())
    }

    /// Step one: stores email and password as a partial registration.
    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn create_partial_user(&self, req: CreatePartialUser) -> Result<PartialUser> {
        trace!("Starting partial registration");
        req.validate()?;
        self.ensure_email_available(&req.email).await?;

        let partial = PartialUser::new(req.email, req.password);
        debug!(partial_id = %partial.id, email = %partial.email, "Saving partial user");
        self.repository
            .insert_partial_user(partial.clone())
            .await
            .map_err(into_conflict(DomainError::EmailTaken))?;

        info!(
            partial_id = %partial.id,
            email = %partial.email,
            "Partial user created"
        );
        Ok(partial)
    }

    /// Step two: turns the partial registration for `req.email` into a user.
    ///
    /// The user insert and the partial delete happen in one storage call, so a
    /// failed write leaves the partial record available for a retry.
    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn complete_registration(&self, req: CompleteRegistration) -> Result<User> {
        trace!("Starting registration completion");
        if self
            .repository
            .find_user_by_email(&req.email)
            .await?
            .is_some()
        {
            warn!(email = %req.email, "User already registered");
            return Err(DomainError::AlreadyRegistered.into());
        }

        req.validate()?;

        let partial = self
            .repository
            .find_partial_user_by_email(&req.email)
            .await?
            .ok_or_else(|| {
                warn!(email = %req.email, "Partial user not found");
                DomainError::PartialUserNotFound
            })?;

        let user = User::from_partial(partial, req);

        debug!(user_id = %user.id, email = %user.email, "Promoting partial user");
        self.repository
            .promote_partial_user(user.clone())
            .await
            .map_err(into_conflict(DomainError::AlreadyRegistered))?;

        info!(
            user_id = %user.id,
            email = %user.email,
            "Registration completed"
        );
        Ok(user)
    }
}

/// Storage uniqueness violations surface as `conflict`; anything else passes through.
fn into_conflict(conflict: DomainError) -> impl FnOnce(anyhow::Error) -> anyhow::Error {
    move |err| {
        if let Some(DomainError::DuplicateEmail(email)) = err.downcast_ref::<DomainError>() {
            warn!(email = %email, "Storage rejected duplicate email");
            return conflict.into();
        }
        error!(error = %err, "Storage write failed");
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::registration_store::InMemoryRegistrationStore;
    use crate::domain::repository::{PartialUserRepository, UserRepository};
    use async_trait::async_trait;

    fn service() -> (
        RegistrationService<InMemoryRegistrationStore>,
        Arc<InMemoryRegistrationStore>,
    ) {
        let store = Arc::new(InMemoryRegistrationStore::new());
        (RegistrationService::new(store.clone()), store)
    }

    fn step_one(email: &str, password: &str) -> CreatePartialUser {
        CreatePartialUser {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn step_two(email: &str, password_hash: Option<&str>) -> CompleteRegistration {
        CompleteRegistration {
            email: email.to_string(),
            auth_provider: "local".to_string(),
            password_hash: password_hash.map(str::to_string),
            username: "alice".to_string(),
            nationality: "US".to_string(),
            team_name: "Red".to_string(),
            referral: None,
        }
    }

    fn domain_error(err: &anyhow::Error) -> &DomainError {
        err.downcast_ref::<DomainError>()
            .expect("expected a domain error")
    }

    #[tokio::test]
    async fn test_end_to_end_registration() {
        let (service, store) = service();
        let partial = service
            .create_partial_user(step_one("a@x.com", "pw1"))
            .await
            .unwrap();

        let user = service
            .complete_registration(step_two("a@x.com", None))
            .await
            .unwrap();

        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.password_hash, "pw1");
        assert_eq!(user.username, "alice");
        assert_eq!(user.auth_provider, "local");
        assert_eq!(user.created_at, partial.created_at);
        assert!(user.referral.is_none());
        assert!(
            store
                .find_partial_user_by_email("a@x.com")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_supplied_hash_overrides_partial_password() {
        let (service, _) = service();
        service
            .create_partial_user(step_one("h@x.com", "plain"))
            .await
            .unwrap();

        let user = service
            .complete_registration(step_two("h@x.com", Some("$argon2id$abc")))
            .await
            .unwrap();

        assert_eq!(user.password_hash, "$argon2id$abc");
    }

    #[tokio::test]
    async fn test_second_partial_creation_is_rejected() {
        let (service, store) = service();
        service
            .create_partial_user(step_one("twice@x.com", "first"))
            .await
            .unwrap();

        let err = service
            .create_partial_user(step_one("twice@x.com", "second"))
            .await
            .unwrap_err();

        assert!(matches!(domain_error(&err), DomainError::EmailTaken));
        let kept = store
            .find_partial_user_by_email("twice@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.password, "first");
    }

    #[tokio::test]
    async fn test_partial_creation_rejected_for_registered_email() {
        let (service, _) = service();
        service
            .create_partial_user(step_one("done@x.com", "pw"))
            .await
            .unwrap();
        service
            .complete_registration(step_two("done@x.com", None))
            .await
            .unwrap();

        let err = service
            .create_partial_user(step_one("done@x.com", "pw"))
            .await
            .unwrap_err();

        assert!(matches!(domain_error(&err), DomainError::EmailTaken));
    }

    #[tokio::test]
    async fn test_partial_creation_rejects_malformed_email() {
        let (service, store) = service();

        let err = service
            .create_partial_user(step_one("not-an-email", "pw"))
            .await
            .unwrap_err();

        assert!(matches!(domain_error(&err), DomainError::Validation(_)));
        assert!(
            store
                .find_partial_user_by_email("not-an-email")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_completion_without_partial_is_not_found() {
        let (service, store) = service();

        let err = service
            .complete_registration(step_two("nobody@x.com", None))
            .await
            .unwrap_err();

        assert!(matches!(domain_error(&err), DomainError::PartialUserNotFound));
        assert!(store.find_user_by_email("nobody@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completion_for_registered_email_is_conflict() {
        let (service, store) = service();
        service
            .create_partial_user(step_one("taken@x.com", "pw"))
            .await
            .unwrap();
        let original = service
            .complete_registration(step_two("taken@x.com", None))
            .await
            .unwrap();

        // A stale partial record, e.g. left behind by an older deployment.
        let stale = PartialUser::new("taken@x.com".to_string(), "stale".to_string());
        store.insert_partial_user(stale.clone()).await.unwrap();

        let err = service
            .complete_registration(step_two("taken@x.com", Some("other")))
            .await
            .unwrap_err();

        assert!(matches!(domain_error(&err), DomainError::AlreadyRegistered));
        assert_eq!(
            store.find_partial_user_by_email("taken@x.com").await.unwrap(),
            Some(stale)
        );
        assert_eq!(
            store.find_user_by_email("taken@x.com").await.unwrap(),
            Some(original)
        );
    }

    #[tokio::test]
    async fn test_completion_rejects_blank_fields_before_touching_state() {
        let (service, store) = service();
        service
            .create_partial_user(step_one("blank@x.com", "pw"))
            .await
            .unwrap();
        let mut req = step_two("blank@x.com", None);
        req.team_name = String::new();

        let err = service.complete_registration(req).await.unwrap_err();

        assert!(matches!(domain_error(&err), DomainError::Validation(_)));
        assert!(
            store
                .find_partial_user_by_email("blank@x.com")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_concurrent_completions_register_once() {
        let (service, store) = service();
        let service = Arc::new(service);
        service
            .create_partial_user(step_one("race@x.com", "pw"))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .complete_registration(step_two("race@x.com", None))
                        .await
                })
            })
            .collect();

        let mut completed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => completed += 1,
                Err(err) => assert!(matches!(
                    domain_error(&err),
                    DomainError::AlreadyRegistered | DomainError::PartialUserNotFound
                )),
            }
        }

        assert_eq!(completed, 1);
        assert!(store.find_user_by_email("race@x.com").await.unwrap().is_some());
        assert!(
            store
                .find_partial_user_by_email("race@x.com")
                .await
                .unwrap()
                .is_none()
        );
    }

    /// Store whose promotion always fails with an infrastructure error.
    struct FailingPromotionStore {
        inner: InMemoryRegistrationStore,
    }

    #[async_trait]
    impl PartialUserRepository for FailingPromotionStore {
        async fn insert_partial_user(&self, partial: PartialUser) -> Result<()> {
            self.inner.insert_partial_user(partial).await
        }

        async fn find_partial_user_by_email(&self, email: &str) -> Result<Option<PartialUser>> {
            self.inner.find_partial_user_by_email(email).await
        }

        async fn delete_partial_user_by_email(&self, email: &str) -> Result<()> {
            self.inner.delete_partial_user_by_email(email).await
        }
    }

    #[async_trait]
    impl UserRepository for FailingPromotionStore {
        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
            self.inner.find_user_by_email(email).await
        }

        async fn insert_user(&self, user: User) -> Result<()> {
            self.inner.insert_user(user).await
        }
    }

    #[async_trait]
    impl RegistrationRepository for FailingPromotionStore {
        async fn promote_partial_user(&self, _user: User) -> Result<()> {
            Err(anyhow::anyhow!("storage unavailable"))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_partial_for_retry() {
        let store = Arc::new(FailingPromotionStore {
            inner: InMemoryRegistrationStore::new(),
        });
        let service = RegistrationService::new(store.clone());
        service
            .create_partial_user(step_one("retry@x.com", "pw"))
            .await
            .unwrap();

        let err = service
            .complete_registration(step_two("retry@x.com", None))
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<DomainError>().is_none());
        assert!(err.to_string().contains("storage unavailable"));
        assert!(
            store
                .find_partial_user_by_email("retry@x.com")
                .await
                .unwrap()
                .is_some()
        );
        assert!(store.find_user_by_email("retry@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_registered_email_with_blank_field_is_conflict() {
        let (service, _) = service();
        service
            .create_partial_user(step_one("a@x.com", "pw1"))
            .await
            .unwrap();
        service
            .complete_registration(step_two("a@x.com", None))
            .await
            .unwrap();
        let mut req = step_two("a@x.com", None);
        req.username = String::new();

        let err = service.complete_registration(req).await.unwrap_err();

        assert!(matches!(domain_error(&err), DomainError::AlreadyRegistered));
    }
}
