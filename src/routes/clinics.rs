use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions::{ATUALIZAR_CLINICAS, CRIAR_CLINICAS, EXCLUIR_CLINICAS, LER_CLINICAS};
use crate::authz::Caller;
use crate::db::Page;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::clinic::{
    Clinic, ClinicCreateRequest, ClinicUpdateRequest, DbClinic, DEFAULT_DESK_COUNT, DEFAULT_MIN_SERVICE_MINUTES,
};
use crate::utils::utc_now;

const CLINIC_COLUMNS: &str = "id, name, address, phone, desk_count, min_service_minutes, created_at, updated_at";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_clinics).post(create_clinic))
        .route("/:id", get(get_clinic).put(update_clinic).delete(delete_clinic))
}

async fn fetch_clinic(pool: &SqlitePool, id: Uuid) -> AppResult<Clinic> {
    sqlx::query_as::<_, DbClinic>(&format!("SELECT {CLINIC_COLUMNS} FROM clinics WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("clinic not found"))?
        .try_into()
}

async fn page_clinics(pool: &SqlitePool, page: Page) -> AppResult<Vec<Clinic>> {
    let rows = sqlx::query_as::<_, DbClinic>(&format!(
        "SELECT {CLINIC_COLUMNS} FROM clinics ORDER BY name LIMIT ? OFFSET ?"
    ))
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Clinic::try_from).collect()
}

fn validate_capacity(desk_count: i64, min_service_minutes: i64) -> AppResult<()> {
    if desk_count < 1 {
        return Err(AppError::bad_request("desk_count must be at least 1"));
    }
    if min_service_minutes < 1 {
        return Err(AppError::bad_request("min_service_minutes must be at least 1"));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/clinics",
    tag = "Clinics",
    request_body = ClinicCreateRequest,
    responses(
        (status = 201, description = "Clinic created", body = Clinic),
        (status = 409, description = "Clinic name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_clinic(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Json(req): Json<ClinicCreateRequest>,
) -> AppResult<(StatusCode, Json<Clinic>)> {
    let identity = state.authz.authorize(caller.0, CRIAR_CLINICAS)?;

    let desk_count = req.desk_count.unwrap_or(DEFAULT_DESK_COUNT);
    let min_service_minutes = req.min_service_minutes.unwrap_or(DEFAULT_MIN_SERVICE_MINUTES);
    validate_capacity(desk_count, min_service_minutes)?;

    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO clinics (id, name, address, phone, desk_count, min_service_minutes, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&req.name)
    .bind(&req.address)
    .bind(req.phone.unwrap_or_default())
    .bind(desk_count)
    .bind(min_service_minutes)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let clinic = fetch_clinic(&state.pool, id).await?;
    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(identity.id),
        &clinic,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(clinic)))
}

#[utoipa::path(
    get,
    path = "/api/clinics",
    tag = "Clinics",
    params(Page),
    responses((status = 200, description = "Clinics", body = Vec<Clinic>)),
    security(("bearerAuth" = []))
)]
pub async fn list_clinics(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<Clinic>>> {
    state.authz.authorize(caller.0, LER_CLINICAS)?;
    Ok(Json(page_clinics(&state.pool, page).await?))
}

/// Clinic picker for the login and sign-up screens.
#[utoipa::path(
    get,
    path = "/api/clinics-public",
    tag = "Clinics",
    params(Page),
    responses((status = 200, description = "Clinics", body = Vec<Clinic>))
)]
pub async fn list_public_clinics(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<Clinic>>> {
    Ok(Json(page_clinics(&state.pool, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/clinics/{id}",
    tag = "Clinics",
    params(("id" = Uuid, Path, description = "Clinic ID")),
    responses(
        (status = 200, description = "Clinic", body = Clinic),
        (status = 404, description = "Clinic not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_clinic(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Clinic>> {
    state.authz.authorize(caller.0, LER_CLINICAS)?;
    Ok(Json(fetch_clinic(&state.pool, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/clinics/{id}",
    tag = "Clinics",
    params(("id" = Uuid, Path, description = "Clinic ID")),
    request_body = ClinicUpdateRequest,
    responses(
        (status = 200, description = "Clinic updated", body = Clinic),
        (status = 404, description = "Clinic not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_clinic(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ClinicUpdateRequest>,
) -> AppResult<Json<Clinic>> {
    let identity = state.authz.authorize(caller.0, ATUALIZAR_CLINICAS)?;
    let old = fetch_clinic(&state.pool, id).await?;

    let desk_count = req.desk_count.unwrap_or(old.desk_count);
    let min_service_minutes = req.min_service_minutes.unwrap_or(old.min_service_minutes);
    validate_capacity(desk_count, min_service_minutes)?;

    sqlx::query(
        "UPDATE clinics SET name = ?, address = ?, phone = ?, desk_count = ?, min_service_minutes = ?, \
         updated_at = ? WHERE id = ?",
    )
    .bind(req.name.unwrap_or_else(|| old.name.clone()))
    .bind(req.address.unwrap_or_else(|| old.address.clone()))
    .bind(req.phone.unwrap_or_else(|| old.phone.clone()))
    .bind(desk_count)
    .bind(min_service_minutes)
    .bind(utc_now())
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    let clinic = fetch_clinic(&state.pool, id).await?;
    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(identity.id),
        &clinic,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(clinic))
}

#[utoipa::path(
    delete,
    path = "/api/clinics/{id}",
    tag = "Clinics",
    params(("id" = Uuid, Path, description = "Clinic ID")),
    responses(
        (status = 204, description = "Clinic deleted"),
        (status = 404, description = "Clinic not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_clinic(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let identity = state.authz.authorize(caller.0, EXCLUIR_CLINICAS)?;
    let clinic = fetch_clinic(&state.pool, id).await?;

    sqlx::query("DELETE FROM clinics WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(identity.id),
        &clinic,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
