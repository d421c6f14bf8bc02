//! Appointments reach their clinic through the patient row, so every query
//! joins `patients` and filters on `p.clinic_id`.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions::{
    ATUALIZAR_AGENDAMENTOS, CRIAR_AGENDAMENTOS, EXCLUIR_AGENDAMENTOS, LER_AGENDAMENTOS,
};
use crate::authz::{Caller, TenantScope};
use crate::db::Page;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::appointment::{
    Appointment, AppointmentCreateRequest, AppointmentUpdateRequest, DbAppointment,
};
use crate::routes::patients::fetch_patient;
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_appointments).post(create_appointment))
        .route(
            "/:id",
            get(get_appointment).put(update_appointment).delete(delete_appointment),
        )
}

fn select_appointments() -> QueryBuilder<'static, Sqlite> {
    QueryBuilder::new(
        "SELECT a.id, a.patient_id, a.scheduled_at, a.desk_number, a.status, a.notes, a.created_at, a.updated_at \
         FROM appointments a JOIN patients p ON p.id = a.patient_id WHERE ",
    )
}

async fn fetch_appointment(pool: &SqlitePool, scope: &TenantScope, id: Uuid) -> AppResult<Appointment> {
    let mut qb = select_appointments();
    qb.push("a.id = ").push_bind(id.to_string()).push(" AND ");
    scope.push_filter(&mut qb, "p.clinic_id");
    qb.build_query_as::<DbAppointment>()
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("appointment not found"))?
        .try_into()
}

fn validate_desk(desk_number: Option<i64>) -> AppResult<()> {
    match desk_number {
        Some(n) if n < 1 => Err(AppError::bad_request("desk_number must be at least 1")),
        _ => Ok(()),
    }
}

#[utoipa::path(
    post,
    path = "/api/appointments",
    tag = "Appointments",
    request_body = AppointmentCreateRequest,
    responses(
        (status = 201, description = "Appointment created", body = Appointment),
        (status = 404, description = "Patient not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_appointment(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Json(req): Json<AppointmentCreateRequest>,
) -> AppResult<(StatusCode, Json<Appointment>)> {
    let identity = caller.identity();
    let scope = state.authz.authorize_scoped(identity, CRIAR_AGENDAMENTOS)?;
    // The patient must be visible to the caller; that pins the tenant.
    fetch_patient(&state.pool, &scope, req.patient_id).await?;
    validate_desk(req.desk_number)?;

    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO appointments (id, patient_id, scheduled_at, desk_number, status, notes, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(req.patient_id.to_string())
    .bind(req.scheduled_at)
    .bind(req.desk_number)
    .bind(req.status.unwrap_or_default().as_str())
    .bind(&req.notes)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let appointment = fetch_appointment(&state.pool, &scope, id).await?;
    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(identity.id),
        &appointment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(appointment)))
}

#[utoipa::path(
    get,
    path = "/api/appointments",
    tag = "Appointments",
    params(Page),
    responses((status = 200, description = "Appointments of the caller's clinic", body = Vec<Appointment>)),
    security(("bearerAuth" = []))
)]
pub async fn list_appointments(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<Appointment>>> {
    let scope = state.authz.authorize_scoped(caller.identity(), LER_AGENDAMENTOS)?;

    let mut qb = select_appointments();
    scope.push_filter(&mut qb, "p.clinic_id");
    qb.push(" ORDER BY a.scheduled_at LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = qb.build_query_as::<DbAppointment>().fetch_all(&state.pool).await?;
    let appointments = rows
        .into_iter()
        .map(Appointment::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(appointments))
}

#[utoipa::path(
    get,
    path = "/api/appointments/{id}",
    tag = "Appointments",
    params(("id" = Uuid, Path, description = "Appointment ID")),
    responses(
        (status = 200, description = "Appointment", body = Appointment),
        (status = 404, description = "Appointment not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_appointment(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Appointment>> {
    let scope = state.authz.authorize_scoped(caller.identity(), LER_AGENDAMENTOS)?;
    Ok(Json(fetch_appointment(&state.pool, &scope, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/appointments/{id}",
    tag = "Appointments",
    params(("id" = Uuid, Path, description = "Appointment ID")),
    request_body = AppointmentUpdateRequest,
    responses(
        (status = 200, description = "Appointment updated", body = Appointment),
        (status = 404, description = "Appointment not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_appointment(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<AppointmentUpdateRequest>,
) -> AppResult<Json<Appointment>> {
    let identity = caller.identity();
    let scope = state.authz.authorize_scoped(identity, ATUALIZAR_AGENDAMENTOS)?;
    let old = fetch_appointment(&state.pool, &scope, id).await?;
    validate_desk(req.desk_number)?;

    sqlx::query(
        "UPDATE appointments SET scheduled_at = ?, desk_number = ?, status = ?, notes = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(req.scheduled_at.unwrap_or(old.scheduled_at))
    .bind(req.desk_number.or(old.desk_number))
    .bind(req.status.unwrap_or(old.status).as_str())
    .bind(req.notes.or_else(|| old.notes.clone()))
    .bind(utc_now())
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    let appointment = fetch_appointment(&state.pool, &scope, id).await?;
    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(identity.id),
        &appointment,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(appointment))
}

#[utoipa::path(
    delete,
    path = "/api/appointments/{id}",
    tag = "Appointments",
    params(("id" = Uuid, Path, description = "Appointment ID")),
    responses(
        (status = 204, description = "Appointment deleted"),
        (status = 404, description = "Appointment not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_appointment(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let identity = caller.identity();
    let scope = state.authz.authorize_scoped(identity, EXCLUIR_AGENDAMENTOS)?;
    let appointment = fetch_appointment(&state.pool, &scope, id).await?;

    sqlx::query("DELETE FROM appointments WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(identity.id),
        &appointment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
