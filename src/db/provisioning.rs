//! Patient creation together with the patient's login identity.

use sqlx::SqlitePool;
use uuid::Uuid;

use super::seed::{insert_user, profile_id_by_name, NewUser};
use crate::authz::catalogue::PATIENT_PROFILE;
use crate::authz::{Denial, TenantScope};
use crate::errors::{AppError, AppResult};
use crate::models::patient::{DbPatient, Patient, PatientCreateRequest};
use crate::utils::{clean_cpf, utc_now};

pub const PATIENT_COLUMNS: &str = "id, name, cpf, rg, birth_date, email, phone, address, legal_guardian, \
     clinic_id, user_id, created_at, updated_at";

/// Inserts the patient and provisions its identity in one transaction.
///
/// The username is the cleaned CPF. An existing identity with that username
/// is switched to the patient profile and linked instead of duplicated, but
/// only when `scope` can see it and it is not a super-user.
pub async fn create_patient(
	pool: &SqlitePool,
	scope: &TenantScope,
	req: PatientCreateRequest,
	clinic_id: Option<Uuid>,
) -> AppResult<Patient> {
	let cpf = clean_cpf(&req.cpf)?;
	let mut tx = pool.begin().await?;

	let profile_id = profile_id_by_name(&mut *tx, PATIENT_PROFILE).await?;
	if profile_id.is_none() {
		tracing::warn!(profile = PATIENT_PROFILE, "patient profile not seeded");
	}

	let existing: Option<(String, Option<String>, bool)> =
		sqlx::query_as("SELECT id, clinic_id, is_superuser FROM users WHERE username = ?")
			.bind(&cpf)
			.fetch_optional(&mut *tx)
			.await?;

	let user_id = match existing {
		Some((id, existing_clinic, is_superuser)) => {
			let existing_clinic = super::parse_opt_uuid(existing_clinic.as_deref(), "users.clinic_id")?;
			if !scope.permits(existing_clinic) {
				tracing::info!(username = %cpf, "refused to link identity of another clinic");
				return Err(AppError::forbidden(Denial::ForeignTenant));
			}
			if is_superuser {
				return Err(AppError::conflict(format!("username {cpf} belongs to a super-user")));
			}
			if let Some(profile_id) = profile_id {
				sqlx::query("UPDATE users SET profile_id = ?, updated_at = ? WHERE id = ?")
					.bind(profile_id.to_string())
					.bind(utc_now())
					.bind(&id)
					.execute(&mut *tx)
					.await?;
			}
			tracing::info!(username = %cpf, "linked existing identity to patient");
			super::parse_uuid(&id, "users.id")?
		}
		None => {
			let user = NewUser {
				email: req.email.clone(),
				first_name: req.name.clone(),
				profile_id,
				clinic_id,
				..NewUser::new(cpf.clone(), req.password.clone().unwrap_or_else(|| cpf.clone()))
			};
			let id = insert_user(&mut *tx, &user).await?;
			tracing::info!(username = %cpf, "provisioned patient identity");
			id
		}
	};

	let id = Uuid::new_v4();
	let now = utc_now();
	sqlx::query(
		"INSERT INTO patients (id, name, cpf, rg, birth_date, email, phone, address, legal_guardian, \
		 clinic_id, user_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
	)
	.bind(id.to_string())
	.bind(&req.name)
	.bind(&cpf)
	.bind(&req.rg)
	.bind(req.birth_date)
	.bind(&req.email)
	.bind(&req.phone)
	.bind(&req.address)
	.bind(&req.legal_guardian)
	.bind(clinic_id.map(|c| c.to_string()))
	.bind(user_id.to_string())
	.bind(now)
	.bind(now)
	.execute(&mut *tx)
	.await?;

	let row = sqlx::query_as::<_, DbPatient>(&format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?"))
		.bind(id.to_string())
		.fetch_one(&mut *tx)
		.await?;

	tx.commit().await?;
	row.try_into()
}
