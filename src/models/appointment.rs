use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::parse_uuid;
use crate::errors::AppError;
use crate::events::Loggable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppointmentStatus {
    #[default]
    Agendado,
    Concluido,
    Cancelado,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Agendado => "AGENDADO",
            AppointmentStatus::Concluido => "CONCLUIDO",
            AppointmentStatus::Cancelado => "CANCELADO",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AGENDADO" => Ok(AppointmentStatus::Agendado),
            "CONCLUIDO" => Ok(AppointmentStatus::Concluido),
            "CANCELADO" => Ok(AppointmentStatus::Cancelado),
            other => Err(AppError::internal(format!("unknown appointment status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub desk_number: Option<i64>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Appointment {
    fn entity_type() -> &'static str { "appointment" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAppointment {
    pub id: String,
    pub patient_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub desk_number: Option<i64>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbAppointment> for Appointment {
    type Error = AppError;

    fn try_from(value: DbAppointment) -> Result<Self, Self::Error> {
        Ok(Appointment {
            id: parse_uuid(&value.id, "appointments.id")?,
            patient_id: parse_uuid(&value.patient_id, "appointments.patient_id")?,
            scheduled_at: value.scheduled_at,
            desk_number: value.desk_number,
            status: value.status.parse()?,
            notes: value.notes,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AppointmentCreateRequest {
    pub patient_id: Uuid,
    #[schema(example = "2025-03-10T14:30:00Z")]
    pub scheduled_at: DateTime<Utc>,
    pub desk_number: Option<i64>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AppointmentUpdateRequest {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub desk_number: Option<i64>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}
