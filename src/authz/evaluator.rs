use super::identity::Identity;
use super::Denial;

/// Policy evaluator trait for pluggable authorization logic
pub trait PolicyEvaluator: Send + Sync {
    /// Decide whether `identity` may exercise `permission`.
    fn check(&self, identity: &Identity, permission: &str) -> Result<(), Denial>;
}

/// Default policy evaluator
///
/// Evaluation order (first match wins):
/// 1. super-user flag -> allow
/// 2. `admin_acesso` in the profile -> allow
/// 3. no profile -> deny (`NoProfile`)
/// 4. exact, case-sensitive name match in the profile -> allow
/// 5. deny (`MissingPermission`)
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl PolicyEvaluator for DefaultPolicyEvaluator {
    fn check(&self, identity: &Identity, permission: &str) -> Result<(), Denial> {
        // 1. Super user bypasses all checks
        if identity.super_user {
            tracing::debug!(
                username = %identity.username,
                permission = %permission,
                "super_user bypass"
            );
            return Ok(());
        }

        // 2. Meta-permission implies every other permission
        if identity.has_full_access() {
            tracing::debug!(
                username = %identity.username,
                permission = %permission,
                "admin_acesso bypass"
            );
            return Ok(());
        }

        // 3. No profile, nothing to match against
        let Some(profile) = identity.profile.as_ref() else {
            tracing::debug!(
                username = %identity.username,
                permission = %permission,
                "no profile assigned"
            );
            return Err(Denial::NoProfile);
        };

        // 4. Named permission membership
        if profile.contains(permission) {
            tracing::debug!(
                username = %identity.username,
                profile = %profile.name,
                permission = %permission,
                "profile permission match"
            );
            return Ok(());
        }

        // 5. Deny
        tracing::debug!(
            username = %identity.username,
            profile = %profile.name,
            permission = %permission,
            "permission denied"
        );
        Err(Denial::MissingPermission(permission.to_string()))
    }
}
