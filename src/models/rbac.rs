use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::parse_uuid;
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

// =============================================================================
// PERMISSION
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    #[schema(example = "ler_pacientes")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Permission {
    fn entity_type() -> &'static str { "permission" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPermission {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbPermission> for Permission {
    type Error = AppError;

    fn try_from(db: DbPermission) -> Result<Self, Self::Error> {
        Ok(Permission {
            id: parse_uuid(&db.id, "permissions.id")?,
            name: db.name,
            description: db.description,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionCreateRequest {
    #[schema(example = "ler_faturas")]
    pub name: String,
    #[schema(example = "Permite visualizar faturas.")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

// =============================================================================
// PROFILE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    pub id: Uuid,
    #[schema(example = "ATENDENTE")]
    pub name: String,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Profile {
    fn entity_type() -> &'static str { "profile" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProfile {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbProfile {
    pub fn into_profile(self, permissions: Vec<Permission>) -> Result<Profile, AppError> {
        Ok(Profile {
            id: parse_uuid(&self.id, "profiles.id")?,
            name: self.name,
            permissions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileCreateRequest {
    #[schema(example = "RECEPCAO")]
    pub name: String,
    /// Permissions granted at creation.
    #[serde(default)]
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    /// When present, replaces the whole permission set.
    pub permission_ids: Option<Vec<Uuid>>,
}

// =============================================================================
// PROFILE-PERMISSION MEMBERSHIP
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfilePermission {
    pub profile_id: Uuid,
    pub permission_id: Uuid,
}

impl Loggable for ProfilePermission {
    fn entity_type() -> &'static str { "profile_permission" }
    fn subject_id(&self) -> Uuid { self.profile_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantPermissionRequest {
    pub permission_id: Uuid,
}
