use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::parse_uuid;
use crate::errors::AppError;
use crate::events::Loggable;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub desk_count: i64,
    pub min_service_minutes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Clinic {
    fn entity_type() -> &'static str { "clinic" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbClinic {
    pub id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub desk_count: i64,
    pub min_service_minutes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbClinic> for Clinic {
    type Error = AppError;

    fn try_from(value: DbClinic) -> Result<Self, Self::Error> {
        Ok(Clinic {
            id: parse_uuid(&value.id, "clinics.id")?,
            name: value.name,
            address: value.address,
            phone: value.phone,
            desk_count: value.desk_count,
            min_service_minutes: value.min_service_minutes,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

pub const DEFAULT_DESK_COUNT: i64 = 1;
pub const DEFAULT_MIN_SERVICE_MINUTES: i64 = 30;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClinicCreateRequest {
    #[schema(example = "Clínica Central")]
    pub name: String,
    #[schema(example = "Rua das Flores, 100")]
    pub address: String,
    #[schema(example = "(11) 3333-4444")]
    pub phone: Option<String>,
    #[schema(example = 3)]
    pub desk_count: Option<i64>,
    #[schema(example = 30)]
    pub min_service_minutes: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClinicUpdateRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub desk_count: Option<i64>,
    pub min_service_minutes: Option<i64>,
}
