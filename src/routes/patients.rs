//! Patient records, tenant-bound through `patients.clinic_id`.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions::{ATUALIZAR_PACIENTES, CRIAR_PACIENTES, EXCLUIR_PACIENTES, LER_PACIENTES};
use crate::authz::{Caller, TenantScope};
use crate::db::provisioning::{create_patient as provision_patient, PATIENT_COLUMNS};
use crate::db::Page;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::patient::{DbPatient, Patient, PatientCreateRequest, PatientUpdateRequest};
use crate::utils::{clean_cpf, utc_now};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_patients).post(create_patient))
        .route("/:id", get(get_patient).put(update_patient).delete(delete_patient))
}

fn select_patients() -> QueryBuilder<'static, Sqlite> {
    QueryBuilder::new(format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE "))
}

/// Loads a patient through the caller's scope; foreign rows are not found.
pub(crate) async fn fetch_patient(pool: &SqlitePool, scope: &TenantScope, id: Uuid) -> AppResult<Patient> {
    let mut qb = select_patients();
    qb.push("id = ").push_bind(id.to_string()).push(" AND ");
    scope.push_filter(&mut qb, "clinic_id");
    qb.build_query_as::<DbPatient>()
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("patient not found"))?
        .try_into()
}

#[utoipa::path(
    post,
    path = "/api/patients",
    tag = "Patients",
    request_body = PatientCreateRequest,
    responses(
        (status = 201, description = "Patient created with its login identity", body = Patient),
        (status = 400, description = "Malformed CPF"),
        (status = 403, description = "Missing permission or foreign clinic"),
        (status = 409, description = "CPF already registered")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_patient(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Json(req): Json<PatientCreateRequest>,
) -> AppResult<(StatusCode, Json<Patient>)> {
    let identity = caller.identity();
    let scope = state.authz.authorize_scoped(identity, CRIAR_PACIENTES)?;
    let clinic_id = scope.stamp(req.clinic_id)?;

    let patient = provision_patient(&state.pool, &scope, req, clinic_id).await?;
    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(identity.id),
        &patient,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(patient)))
}

#[utoipa::path(
    get,
    path = "/api/patients",
    tag = "Patients",
    params(Page),
    responses((status = 200, description = "Patients of the caller's clinic", body = Vec<Patient>)),
    security(("bearerAuth" = []))
)]
pub async fn list_patients(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<Patient>>> {
    let scope = state.authz.authorize_scoped(caller.identity(), LER_PACIENTES)?;

    let mut qb = select_patients();
    scope.push_filter(&mut qb, "clinic_id");
    qb.push(" ORDER BY name LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = qb.build_query_as::<DbPatient>().fetch_all(&state.pool).await?;
    let patients = rows.into_iter().map(Patient::try_from).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(patients))
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}",
    tag = "Patients",
    params(("id" = Uuid, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "Patient", body = Patient),
        (status = 404, description = "Patient not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_patient(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Patient>> {
    let scope = state.authz.authorize_scoped(caller.identity(), LER_PACIENTES)?;
    Ok(Json(fetch_patient(&state.pool, &scope, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/patients/{id}",
    tag = "Patients",
    params(("id" = Uuid, Path, description = "Patient ID")),
    request_body = PatientUpdateRequest,
    responses(
        (status = 200, description = "Patient updated", body = Patient),
        (status = 404, description = "Patient not found"),
        (status = 409, description = "CPF already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_patient(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<PatientUpdateRequest>,
) -> AppResult<Json<Patient>> {
    let identity = caller.identity();
    let scope = state.authz.authorize_scoped(identity, ATUALIZAR_PACIENTES)?;
    let old = fetch_patient(&state.pool, &scope, id).await?;

    let cpf = match req.cpf.as_deref() {
        Some(raw) => clean_cpf(raw)?,
        None => old.cpf.clone(),
    };

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "UPDATE patients SET name = ?, cpf = ?, rg = ?, birth_date = ?, email = ?, phone = ?, address = ?, \
         legal_guardian = ?, updated_at = ? WHERE id = ?",
    )
    .bind(req.name.unwrap_or_else(|| old.name.clone()))
    .bind(&cpf)
    .bind(req.rg.or_else(|| old.rg.clone()))
    .bind(req.birth_date.unwrap_or(old.birth_date))
    .bind(req.email.or_else(|| old.email.clone()))
    .bind(req.phone.or_else(|| old.phone.clone()))
    .bind(req.address.or_else(|| old.address.clone()))
    .bind(req.legal_guardian.or_else(|| old.legal_guardian.clone()))
    .bind(utc_now())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    // The provisioned login is named after the CPF; keep the two in step.
    if let Some(user_id) = old.user_id.filter(|_| cpf != old.cpf) {
        sqlx::query("UPDATE users SET username = ?, updated_at = ? WHERE id = ? AND username = ?")
            .bind(&cpf)
            .bind(utc_now())
            .bind(user_id.to_string())
            .bind(&old.cpf)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    let patient = fetch_patient(&state.pool, &scope, id).await?;
    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(identity.id),
        &patient,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(patient))
}

#[utoipa::path(
    delete,
    path = "/api/patients/{id}",
    tag = "Patients",
    params(("id" = Uuid, Path, description = "Patient ID")),
    responses(
        (status = 204, description = "Patient deleted"),
        (status = 404, description = "Patient not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_patient(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let identity = caller.identity();
    let scope = state.authz.authorize_scoped(identity, EXCLUIR_PACIENTES)?;
    let patient = fetch_patient(&state.pool, &scope, id).await?;

    sqlx::query("DELETE FROM patients WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(identity.id),
        &patient,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
