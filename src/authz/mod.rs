//! Authorization module - identity resolution, permission evaluation and
//! tenant scoping
//!
//! Every protected request goes through the same straight-line pipeline:
//! bearer credential -> identity -> active check -> permission check ->
//! tenant scope. Each gate fails fast with its own error kind.

pub mod catalogue;
mod evaluator;
pub mod extract;
mod identity;
mod resolver;
pub mod tenant;

pub use catalogue::PermissionName;
pub use evaluator::{DefaultPolicyEvaluator, PolicyEvaluator};
pub use extract::Caller;
pub use identity::{Identity, Profile};
pub use resolver::{ensure_active, IdentityResolver, IdentityStore};
pub use tenant::{scope_for, TenantScope};

use std::fmt;
use std::sync::Arc;

use crate::errors::{AppError, AppResult};

/// Why an authenticated, active identity was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    NoProfile,
    MissingPermission(String),
    ForeignTenant,
    SuperUserRequired,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::NoProfile => f.write_str("no profile assigned"),
            Denial::MissingPermission(name) => write!(f, "missing permission: {name}"),
            Denial::ForeignTenant => f.write_str("clinic is outside the caller's tenant"),
            Denial::SuperUserRequired => f.write_str("only super-users may grant or modify super-user accounts"),
        }
    }
}

/// Composed authorization pipeline shared through `AppState`.
#[derive(Clone)]
pub struct Authorizer {
    resolver: IdentityResolver,
    evaluator: Arc<dyn PolicyEvaluator>,
}

impl Authorizer {
    pub fn new(resolver: IdentityResolver, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self { resolver, evaluator }
    }

    /// Resolve a credential and reject deactivated identities.
    pub async fn resolve_active(&self, raw: &str) -> AppResult<Identity> {
        let identity = self.resolver.resolve(raw).await?;
        ensure_active(identity)
    }

    /// Check one required permission for an already resolved identity.
    pub fn authorize(&self, identity: Identity, permission: &str) -> AppResult<Identity> {
        match self.evaluator.check(&identity, permission) {
            Ok(()) => Ok(identity),
            Err(denial) => {
                tracing::info!(
                    username = %identity.username,
                    permission = %permission,
                    reason = %denial,
                    "authorization denied"
                );
                Err(AppError::forbidden(denial))
            }
        }
    }

    /// Permission check plus the tenant scope the handler must apply.
    pub fn authorize_scoped(&self, identity: &Identity, permission: &str) -> AppResult<TenantScope> {
        self.evaluator.check(identity, permission).map_err(|denial| {
            tracing::info!(
                username = %identity.username,
                permission = %permission,
                reason = %denial,
                "authorization denied"
            );
            AppError::forbidden(denial)
        })?;
        Ok(TenantScope::for_identity(identity))
    }

    pub async fn resolve_and_authorize(&self, raw: &str, permission: &str) -> AppResult<Identity> {
        let identity = self.resolve_active(raw).await?;
        self.authorize(identity, permission)
    }

    pub async fn resolve_and_authorize_scoped(
        &self,
        raw: &str,
        permission: &str,
    ) -> AppResult<(Identity, TenantScope)> {
        let identity = self.resolve_active(raw).await?;
        let scope = self.authorize_scoped(&identity, permission)?;
        Ok((identity, scope))
    }
}

/// Well-known permission names used by the REST handlers
pub mod permissions {
    pub const ADMIN_ACESSO: &str = "admin_acesso";

    // Clinics
    pub const CRIAR_CLINICAS: &str = "criar_clinicas";
    pub const LER_CLINICAS: &str = "ler_clinicas";
    pub const ATUALIZAR_CLINICAS: &str = "atualizar_clinicas";
    pub const EXCLUIR_CLINICAS: &str = "excluir_clinicas";

    // Profiles
    pub const CRIAR_PERFIS: &str = "criar_perfis";
    pub const LER_PERFIS: &str = "ler_perfis";
    pub const ATUALIZAR_PERFIS: &str = "atualizar_perfis";
    pub const EXCLUIR_PERFIS: &str = "excluir_perfis";

    // Permissions
    pub const CRIAR_PERMISSOES: &str = "criar_permissoes";
    pub const LER_PERMISSOES: &str = "ler_permissoes";
    pub const ATUALIZAR_PERMISSOES: &str = "atualizar_permissoes";
    pub const EXCLUIR_PERMISSOES: &str = "excluir_permissoes";

    // Users
    pub const CRIAR_USUARIOS: &str = "criar_usuarios";
    pub const LER_USUARIOS: &str = "ler_usuarios";
    pub const ATUALIZAR_USUARIOS: &str = "atualizar_usuarios";
    pub const EXCLUIR_USUARIOS: &str = "excluir_usuarios";

    // Patients
    pub const CRIAR_PACIENTES: &str = "criar_pacientes";
    pub const LER_PACIENTES: &str = "ler_pacientes";
    pub const ATUALIZAR_PACIENTES: &str = "atualizar_pacientes";
    pub const EXCLUIR_PACIENTES: &str = "excluir_pacientes";

    // Appointments
    pub const CRIAR_AGENDAMENTOS: &str = "criar_agendamentos";
    pub const LER_AGENDAMENTOS: &str = "ler_agendamentos";
    pub const ATUALIZAR_AGENDAMENTOS: &str = "atualizar_agendamentos";
    pub const EXCLUIR_AGENDAMENTOS: &str = "excluir_agendamentos";
}

#[cfg(test)]
mod tests {
    use super::permissions::*;
    use super::resolver::tests::{codec, MemoryStore};
    use super::*;
    use crate::jwt::CredentialCodec;
    use uuid::Uuid;

    fn admin_profile() -> Profile {
        Profile::new(Uuid::new_v4(), "ADMIN").with_permissions([
            CRIAR_CLINICAS,
            LER_CLINICAS,
            ATUALIZAR_CLINICAS,
            EXCLUIR_CLINICAS,
            LER_PACIENTES,
        ])
    }

    fn authorizer(identities: Vec<Identity>) -> (Authorizer, Arc<crate::jwt::JwtConfig>) {
        let codec = codec();
        let resolver = IdentityResolver::new(codec.clone(), Arc::new(MemoryStore::with(identities)));
        (Authorizer::new(resolver, Arc::new(DefaultPolicyEvaluator::new())), codec)
    }

    #[tokio::test]
    async fn admin_profile_scenario() {
        let clinic = Uuid::new_v4();
        let admin = Identity::new(Uuid::new_v4(), "gerente")
            .with_profile(admin_profile())
            .with_clinic(clinic);
        let (authz, codec) = authorizer(vec![admin]);
        let token = codec.issue("gerente", None).unwrap();

        let identity = authz.resolve_and_authorize(&token, CRIAR_CLINICAS).await.unwrap();
        assert_eq!(identity.username, "gerente");

        let err = authz.resolve_and_authorize(&token, "excluir_faturas").await.unwrap_err();
        assert_eq!(err.denial(), Some(&Denial::MissingPermission("excluir_faturas".into())));

        let (_, scope) = authz.resolve_and_authorize_scoped(&token, LER_PACIENTES).await.unwrap();
        assert_eq!(scope, TenantScope::Clinic(clinic));
    }

    #[tokio::test]
    async fn no_profile_scenario() {
        let (authz, codec) = authorizer(vec![Identity::new(Uuid::new_v4(), "semperfil")]);
        let token = codec.issue("semperfil", None).unwrap();

        let err = authz.resolve_and_authorize(&token, LER_PACIENTES).await.unwrap_err();
        assert_eq!(err.denial(), Some(&Denial::NoProfile));
        assert!(err.to_string().contains("no profile assigned"));
    }

    #[tokio::test]
    async fn inactive_scenario_stops_before_evaluation() {
        let everything = Profile::new(Uuid::new_v4(), "ADMIN").with_permissions([ADMIN_ACESSO]);
        let disabled = Identity::new(Uuid::new_v4(), "desligado")
            .with_profile(everything)
            .inactive();
        let (authz, codec) = authorizer(vec![disabled]);
        let token = codec.issue("desligado", None).unwrap();

        let err = authz.resolve_and_authorize(&token, LER_PACIENTES).await.unwrap_err();
        assert!(matches!(err, AppError::InactiveAccount));
    }

    #[tokio::test]
    async fn ghost_subject_scenario() {
        let (authz, codec) = authorizer(vec![]);
        let token = codec.issue("ghost", None).unwrap();

        let err = authz.resolve_and_authorize(&token, LER_PACIENTES).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn super_user_scope_is_global() {
        let root = Identity::new(Uuid::new_v4(), "root").super_user();
        let (authz, codec) = authorizer(vec![root]);
        let token = codec.issue("root", None).unwrap();

        let (_, scope) = authz
            .resolve_and_authorize_scoped(&token, "permissao_inexistente")
            .await
            .unwrap();
        assert!(scope.is_global());
    }
}
