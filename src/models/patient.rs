use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::{parse_opt_uuid, parse_uuid};
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    /// Digits only.
    #[schema(example = "12345678901")]
    pub cpf: String,
    pub rg: Option<String>,
    pub birth_date: NaiveDate,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub legal_guardian: Option<String>,
    pub clinic_id: Option<Uuid>,
    /// Login account provisioned for this patient, if any.
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Patient {
    fn entity_type() -> &'static str { "patient" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Important }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPatient {
    pub id: String,
    pub name: String,
    pub cpf: String,
    pub rg: Option<String>,
    pub birth_date: NaiveDate,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub legal_guardian: Option<String>,
    pub clinic_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbPatient> for Patient {
    type Error = AppError;

    fn try_from(value: DbPatient) -> Result<Self, Self::Error> {
        Ok(Patient {
            id: parse_uuid(&value.id, "patients.id")?,
            name: value.name,
            cpf: value.cpf,
            rg: value.rg,
            birth_date: value.birth_date,
            email: value.email,
            phone: value.phone,
            address: value.address,
            legal_guardian: value.legal_guardian,
            clinic_id: parse_opt_uuid(value.clinic_id.as_deref(), "patients.clinic_id")?,
            user_id: parse_opt_uuid(value.user_id.as_deref(), "patients.user_id")?,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PatientCreateRequest {
    #[schema(example = "Maria da Silva")]
    pub name: String,
    /// Punctuation is stripped before storage.
    #[schema(example = "123.456.789-01")]
    pub cpf: String,
    pub rg: Option<String>,
    #[schema(value_type = String, format = Date, example = "1990-05-17")]
    pub birth_date: NaiveDate,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub legal_guardian: Option<String>,
    /// Ignored for clinic-bound callers unless it names their own clinic.
    pub clinic_id: Option<Uuid>,
    /// Initial password of the provisioned login. Defaults to the CPF digits.
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PatientUpdateRequest {
    pub name: Option<String>,
    pub cpf: Option<String>,
    pub rg: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub birth_date: Option<NaiveDate>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub legal_guardian: Option<String>,
}
