use std::collections::HashSet;

use uuid::Uuid;

use super::permissions::ADMIN_ACESSO;

/// Resolved principal with its profile and the profile's permission set
/// loaded up front, so evaluation never touches the database.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    /// Subject identifier carried in the bearer credential.
    pub username: String,
    pub active: bool,
    pub super_user: bool,
    pub profile: Option<Profile>,
    pub clinic_id: Option<Uuid>,
}

impl Identity {
    pub fn new(id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            active: true,
            super_user: false,
            profile: None,
            clinic_id: None,
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_clinic(mut self, clinic_id: Uuid) -> Self {
        self.clinic_id = Some(clinic_id);
        self
    }

    pub fn super_user(mut self) -> Self {
        self.super_user = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// True when the profile carries the `admin_acesso` meta-permission.
    pub fn has_full_access(&self) -> bool {
        self.profile
            .as_ref()
            .map(|p| p.contains(ADMIN_ACESSO))
            .unwrap_or(false)
    }
}

/// Named permission bundle. Membership is a set: granting twice is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub permissions: HashSet<String>,
}

impl Profile {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            permissions: HashSet::new(),
        }
    }

    pub fn with_permissions<I, S>(mut self, perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(perms.into_iter().map(Into::into));
        self
    }

    /// Returns `false` if the permission was already granted.
    pub fn grant(&mut self, permission: impl Into<String>) -> bool {
        self.permissions.insert(permission.into())
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granting_twice_keeps_one_entry() {
        let mut profile = Profile::new(Uuid::new_v4(), "ATENDENTE");
        assert!(profile.grant("ler_pacientes"));
        let snapshot = profile.permissions.clone();
        assert!(!profile.grant("ler_pacientes"));
        assert_eq!(profile.permissions, snapshot);
        assert_eq!(profile.permissions.len(), 1);
    }

    #[test]
    fn full_access_requires_meta_permission() {
        let plain = Identity::new(Uuid::new_v4(), "ana")
            .with_profile(Profile::new(Uuid::new_v4(), "ATENDENTE").with_permissions(["ler_pacientes"]));
        assert!(!plain.has_full_access());

        let admin = Identity::new(Uuid::new_v4(), "root")
            .with_profile(Profile::new(Uuid::new_v4(), "ADMIN").with_permissions([ADMIN_ACESSO]));
        assert!(admin.has_full_access());

        assert!(!Identity::new(Uuid::new_v4(), "nobody").has_full_access());
    }
}
