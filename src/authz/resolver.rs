use std::sync::Arc;

use async_trait::async_trait;

use super::identity::Identity;
use crate::errors::{AppError, AppResult};
use crate::jwt::CredentialCodec;

const COULD_NOT_VALIDATE: &str = "could not validate credentials";

/// Lookup of identities by subject identifier.
///
/// Implementations must return the profile and its permission set already
/// loaded; the evaluator never goes back to storage.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_subject(&self, subject: &str) -> AppResult<Option<Identity>>;
}

/// Turns a raw bearer credential into a stored identity.
#[derive(Clone)]
pub struct IdentityResolver {
    codec: Arc<dyn CredentialCodec>,
    store: Arc<dyn IdentityStore>,
}

impl IdentityResolver {
    pub fn new(codec: Arc<dyn CredentialCodec>, store: Arc<dyn IdentityStore>) -> Self {
        Self { codec, store }
    }

    pub async fn resolve(&self, raw: &str) -> AppResult<Identity> {
        let claims = self.codec.parse(raw).map_err(|err| {
            tracing::debug!(error = %err, "credential rejected");
            AppError::unauthenticated(COULD_NOT_VALIDATE)
        })?;

        let subject = claims
            .sub
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::unauthenticated(COULD_NOT_VALIDATE))?;

        match self.store.find_by_subject(&subject).await? {
            Some(identity) => Ok(identity),
            None => {
                tracing::debug!(subject = %subject, "credential subject has no identity");
                Err(AppError::unauthenticated(COULD_NOT_VALIDATE))
            }
        }
    }
}

/// Rejects administratively disabled identities.
pub fn ensure_active(identity: Identity) -> AppResult<Identity> {
    if !identity.active {
        tracing::info!(username = %identity.username, "inactive identity rejected");
        return Err(AppError::InactiveAccount);
    }
    Ok(identity)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::authz::identity::Profile;
    use crate::jwt::JwtConfig;
    use chrono::Duration;
    use std::collections::HashMap;
    use uuid::Uuid;

    /// In-memory store used by the authz unit tests.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub identities: HashMap<String, Identity>,
    }

    impl MemoryStore {
        pub(crate) fn with(identities: impl IntoIterator<Item = Identity>) -> Self {
            Self {
                identities: identities.into_iter().map(|i| (i.username.clone(), i)).collect(),
            }
        }
    }

    #[async_trait]
    impl IdentityStore for MemoryStore {
        async fn find_by_subject(&self, subject: &str) -> AppResult<Option<Identity>> {
            Ok(self.identities.get(subject).cloned())
        }
    }

    pub(crate) fn codec() -> Arc<JwtConfig> {
        Arc::new(JwtConfig::new("resolver-secret", 1))
    }

    fn resolver(codec: Arc<JwtConfig>) -> IdentityResolver {
        let ana = Identity::new(Uuid::new_v4(), "ana")
            .with_profile(Profile::new(Uuid::new_v4(), "ATENDENTE").with_permissions(["ler_pacientes"]));
        IdentityResolver::new(codec, Arc::new(MemoryStore::with([ana])))
    }

    fn is_unauthenticated(result: AppResult<Identity>) -> bool {
        matches!(result, Err(AppError::Unauthenticated(_)))
    }

    #[tokio::test]
    async fn resolves_known_subject_with_permissions() {
        let codec = codec();
        let token = codec.issue("ana", None).unwrap();
        let identity = resolver(codec).resolve(&token).await.unwrap();
        assert_eq!(identity.username, "ana");
        assert!(identity.profile.unwrap().contains("ler_pacientes"));
    }

    #[tokio::test]
    async fn empty_credential_is_unauthenticated() {
        assert!(is_unauthenticated(resolver(codec()).resolve("").await));
    }

    #[tokio::test]
    async fn tampered_credential_is_unauthenticated() {
        let forged = JwtConfig::new("attacker-secret", 1).issue("ana", None).unwrap();
        assert!(is_unauthenticated(resolver(codec()).resolve(&forged).await));
    }

    #[tokio::test]
    async fn expired_credential_is_unauthenticated() {
        let codec = codec();
        let token = codec.issue("ana", Some(Duration::hours(-3))).unwrap();
        assert!(is_unauthenticated(resolver(codec).resolve(&token).await));
    }

    #[tokio::test]
    async fn unknown_subject_is_unauthenticated() {
        let codec = codec();
        let token = codec.issue("ghost", None).unwrap();
        assert!(is_unauthenticated(resolver(codec).resolve(&token).await));
    }

    #[tokio::test]
    async fn blank_subject_is_unauthenticated() {
        let codec = codec();
        let token = codec.issue("  ", None).unwrap();
        assert!(is_unauthenticated(resolver(codec).resolve(&token).await));
    }

    #[test]
    fn ensure_active_passes_active_identity_through() {
        let identity = Identity::new(Uuid::new_v4(), "ana").with_clinic(Uuid::new_v4());
        let passed = ensure_active(identity.clone()).unwrap();
        assert_eq!(passed.id, identity.id);
        assert_eq!(passed.clinic_id, identity.clinic_id);
    }

    #[test]
    fn ensure_active_rejects_inactive_identity() {
        let identity = Identity::new(Uuid::new_v4(), "ana").inactive();
        assert!(matches!(ensure_active(identity), Err(AppError::InactiveAccount)));
    }
}
