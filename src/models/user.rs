use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::{parse_opt_uuid, parse_uuid};
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub profile: Option<ProfileSummary>,
    pub clinic_id: Option<Uuid>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for User {
    fn entity_type() -> &'static str { "user" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity {
        if self.is_superuser { Severity::Critical } else { Severity::Important }
    }
}

/// Row of `users` joined with the profile name. `password_hash` never
/// leaves this struct.
#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub profile_id: Option<String>,
    pub profile_name: Option<String>,
    pub clinic_id: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column list matching `DbUser`; expects `users` aliased as `u` and
/// `profiles` left-joined as `p`.
pub const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password_hash, u.first_name, u.last_name, \
     u.is_active, u.is_superuser, u.profile_id, p.name AS profile_name, u.clinic_id, u.last_login, \
     u.created_at, u.updated_at";

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        let profile = match (value.profile_id.as_deref(), value.profile_name) {
            (Some(id), Some(name)) => Some(ProfileSummary {
                id: parse_uuid(id, "users.profile_id")?,
                name,
            }),
            _ => None,
        };

        Ok(User {
            id: parse_uuid(&value.id, "users.id")?,
            username: value.username,
            email: value.email,
            first_name: value.first_name,
            last_name: value.last_name,
            is_active: value.is_active,
            is_superuser: value.is_superuser,
            profile,
            clinic_id: parse_opt_uuid(value.clinic_id.as_deref(), "users.clinic_id")?,
            last_login: value.last_login,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserCreateRequest {
    #[schema(example = "recepcao01")]
    pub username: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    #[schema(example = "recepcao@clinica.com")]
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_id: Option<Uuid>,
    pub clinic_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserUpdateRequest {
    pub password: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_id: Option<Uuid>,
    pub clinic_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "admin")]
    pub username: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: String,
}

/// The caller and the permission tokens of their profile.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentUser {
    #[serde(flatten)]
    pub user: User,
    pub permissions: Vec<String>,
}
