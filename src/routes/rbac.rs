//! Profile and permission administration.
//!
//! Both resources are global: gated by permission only, never tenant
//! filtered. Every write is audited with Critical severity.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions::*;
use crate::authz::{Caller, PermissionName};
use crate::db::Page;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::rbac::*;
use crate::utils::utc_now;

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        // Profiles
        .route("/profiles", get(list_profiles).post(create_profile))
        .route("/profiles/:id", get(get_profile).put(update_profile).delete(delete_profile))
        .route("/profiles/:id/permissions", post(grant_permission))
        .route("/profiles/:id/permissions/:permission_id", delete(revoke_permission))
        // Permissions
        .route("/permissions", get(list_permissions).post(create_permission))
        .route(
            "/permissions/:id",
            get(get_permission).put(update_permission).delete(delete_permission),
        )
}

// =============================================================================
// QUERIES
// =============================================================================

const PERMISSION_COLUMNS: &str = "id, name, description, created_at, updated_at";

async fn fetch_permission(pool: &SqlitePool, id: Uuid) -> AppResult<Permission> {
    sqlx::query_as::<_, DbPermission>(&format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("permission {id} not found")))?
        .try_into()
}

async fn profile_permissions(pool: &SqlitePool, profile_id: &str) -> AppResult<Vec<Permission>> {
    let rows = sqlx::query_as::<_, DbPermission>(
        "SELECT perm.id, perm.name, perm.description, perm.created_at, perm.updated_at \
         FROM permissions perm \
         JOIN profile_permissions pp ON pp.permission_id = perm.id \
         WHERE pp.profile_id = ? \
         ORDER BY perm.name",
    )
    .bind(profile_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Permission::try_from).collect()
}

async fn fetch_profile(pool: &SqlitePool, id: Uuid) -> AppResult<Profile> {
    let row = sqlx::query_as::<_, DbProfile>(
        "SELECT id, name, created_at, updated_at FROM profiles WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("profile not found"))?;

    let permissions = profile_permissions(pool, &row.id).await?;
    row.into_profile(permissions)
}

/// Every id must name an existing permission.
async fn ensure_permissions_exist(pool: &SqlitePool, ids: &[Uuid]) -> AppResult<()> {
    for id in ids {
        fetch_permission(pool, *id).await?;
    }
    Ok(())
}

fn validate_profile_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::bad_request("profile name must not be empty"));
    }
    Ok(())
}

// =============================================================================
// PROFILE ENDPOINTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/api/profiles",
    tag = "RBAC",
    params(Page),
    responses((status = 200, description = "Profiles with their permissions", body = Vec<Profile>)),
    security(("bearerAuth" = []))
)]
pub async fn list_profiles(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<Profile>>> {
    state.authz.authorize(caller.0, LER_PERFIS)?;

    let rows = sqlx::query_as::<_, DbProfile>(
        "SELECT id, name, created_at, updated_at FROM profiles ORDER BY name LIMIT ? OFFSET ?",
    )
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let mut profiles = Vec::with_capacity(rows.len());
    for row in rows {
        let permissions = profile_permissions(&state.pool, &row.id).await?;
        profiles.push(row.into_profile(permissions)?);
    }
    Ok(Json(profiles))
}

#[utoipa::path(
    post,
    path = "/api/profiles",
    tag = "RBAC",
    request_body = ProfileCreateRequest,
    responses(
        (status = 201, description = "Profile created", body = Profile),
        (status = 404, description = "Unknown permission id"),
        (status = 409, description = "Profile name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_profile(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Json(req): Json<ProfileCreateRequest>,
) -> AppResult<(StatusCode, Json<Profile>)> {
    let identity = state.authz.authorize(caller.0, CRIAR_PERFIS)?;
    validate_profile_name(&req.name)?;
    ensure_permissions_exist(&state.pool, &req.permission_ids).await?;

    let id = Uuid::new_v4();
    let now = utc_now();
    let mut tx = state.pool.begin().await?;

    sqlx::query("INSERT INTO profiles (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(req.name.trim())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    for permission_id in &req.permission_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO profile_permissions (profile_id, permission_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(permission_id.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let profile = fetch_profile(&state.pool, id).await?;
    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(identity.id),
        &profile,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(profile)))
}

#[utoipa::path(
    get,
    path = "/api/profiles/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Profile ID")),
    responses(
        (status = 200, description = "Profile", body = Profile),
        (status = 404, description = "Profile not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_profile(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Profile>> {
    state.authz.authorize(caller.0, LER_PERFIS)?;
    Ok(Json(fetch_profile(&state.pool, id).await?))
}

/// Rename a profile and, when `permission_ids` is present, replace its
/// whole permission set.
#[utoipa::path(
    put,
    path = "/api/profiles/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Profile ID")),
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = Profile),
        (status = 404, description = "Profile or permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<ProfileUpdateRequest>,
) -> AppResult<Json<Profile>> {
    let identity = state.authz.authorize(caller.0, ATUALIZAR_PERFIS)?;
    let old = fetch_profile(&state.pool, id).await?;

    if let Some(name) = req.name.as_deref() {
        validate_profile_name(name)?;
    }
    if let Some(ids) = req.permission_ids.as_deref() {
        ensure_permissions_exist(&state.pool, ids).await?;
    }

    let now = utc_now();
    let mut tx = state.pool.begin().await?;

    sqlx::query("UPDATE profiles SET name = ?, updated_at = ? WHERE id = ?")
        .bind(req.name.as_deref().map(str::trim).unwrap_or(&old.name))
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    if let Some(ids) = &req.permission_ids {
        sqlx::query("DELETE FROM profile_permissions WHERE profile_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        for permission_id in ids {
            sqlx::query(
                "INSERT OR IGNORE INTO profile_permissions (profile_id, permission_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(id.to_string())
            .bind(permission_id.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
    }
    tx.commit().await?;

    let profile = fetch_profile(&state.pool, id).await?;
    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(identity.id),
        &profile,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(profile))
}

/// Identities holding the profile are left without one.
#[utoipa::path(
    delete,
    path = "/api/profiles/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Profile ID")),
    responses(
        (status = 204, description = "Profile deleted"),
        (status = 404, description = "Profile not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_profile(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let identity = state.authz.authorize(caller.0, EXCLUIR_PERFIS)?;
    let profile = fetch_profile(&state.pool, id).await?;

    sqlx::query("DELETE FROM profiles WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(identity.id),
        &profile,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Granting an already granted permission changes nothing.
#[utoipa::path(
    post,
    path = "/api/profiles/{id}/permissions",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Profile ID")),
    request_body = GrantPermissionRequest,
    responses(
        (status = 204, description = "Permission granted"),
        (status = 404, description = "Profile or permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn grant_permission(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<GrantPermissionRequest>,
) -> AppResult<StatusCode> {
    let identity = state.authz.authorize(caller.0, ATUALIZAR_PERFIS)?;
    fetch_profile(&state.pool, id).await?;
    fetch_permission(&state.pool, req.permission_id).await?;

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO profile_permissions (profile_id, permission_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(req.permission_id.to_string())
    .bind(utc_now())
    .execute(&state.pool)
    .await?
    .rows_affected();

    if inserted > 0 {
        let membership = ProfilePermission {
            profile_id: id,
            permission_id: req.permission_id,
        };
        log_activity_with_context(
            &state.event_bus,
            "granted",
            Some(identity.id),
            &membership,
            None,
            Some(RequestContext::from_headers(&headers)),
        );
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/profiles/{id}/permissions/{permission_id}",
    tag = "RBAC",
    params(
        ("id" = Uuid, Path, description = "Profile ID"),
        ("permission_id" = Uuid, Path, description = "Permission ID"),
    ),
    responses(
        (status = 204, description = "Permission revoked"),
        (status = 404, description = "Profile not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_permission(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path((id, permission_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let identity = state.authz.authorize(caller.0, ATUALIZAR_PERFIS)?;
    fetch_profile(&state.pool, id).await?;

    let removed = sqlx::query("DELETE FROM profile_permissions WHERE profile_id = ? AND permission_id = ?")
        .bind(id.to_string())
        .bind(permission_id.to_string())
        .execute(&state.pool)
        .await?
        .rows_affected();

    if removed > 0 {
        let membership = ProfilePermission {
            profile_id: id,
            permission_id,
        };
        log_activity_with_context(
            &state.event_bus,
            "revoked",
            Some(identity.id),
            &membership,
            None,
            Some(RequestContext::from_headers(&headers)),
        );
    }

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// PERMISSION ENDPOINTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/api/permissions",
    tag = "RBAC",
    params(Page),
    responses((status = 200, description = "Permission catalogue", body = Vec<Permission>)),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<Permission>>> {
    state.authz.authorize(caller.0, LER_PERMISSOES)?;

    let rows = sqlx::query_as::<_, DbPermission>(&format!(
        "SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY name LIMIT ? OFFSET ?"
    ))
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let permissions = rows.into_iter().map(Permission::try_from).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(permissions))
}

#[utoipa::path(
    post,
    path = "/api/permissions",
    tag = "RBAC",
    request_body = PermissionCreateRequest,
    responses(
        (status = 201, description = "Permission created", body = Permission),
        (status = 400, description = "Malformed permission name"),
        (status = 409, description = "Permission name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Json(req): Json<PermissionCreateRequest>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    let identity = state.authz.authorize(caller.0, CRIAR_PERMISSOES)?;
    let name = PermissionName::parse(&req.name)?;

    let id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO permissions (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name.as_str())
    .bind(&req.description)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let permission = fetch_permission(&state.pool, id).await?;
    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(identity.id),
        &permission,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(permission)))
}

#[utoipa::path(
    get,
    path = "/api/permissions/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Permission ID")),
    responses(
        (status = 200, description = "Permission", body = Permission),
        (status = 404, description = "Permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_permission(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Permission>> {
    state.authz.authorize(caller.0, LER_PERMISSOES)?;
    Ok(Json(fetch_permission(&state.pool, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/permissions/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Permission ID")),
    request_body = PermissionUpdateRequest,
    responses(
        (status = 200, description = "Permission updated", body = Permission),
        (status = 404, description = "Permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_permission(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<PermissionUpdateRequest>,
) -> AppResult<Json<Permission>> {
    let identity = state.authz.authorize(caller.0, ATUALIZAR_PERMISSOES)?;
    let old = fetch_permission(&state.pool, id).await?;

    let name = match req.name.as_deref() {
        Some(raw) => PermissionName::parse(raw)?.into_inner(),
        None => old.name.clone(),
    };

    sqlx::query("UPDATE permissions SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(req.description.or_else(|| old.description.clone()))
        .bind(utc_now())
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    let permission = fetch_permission(&state.pool, id).await?;
    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(identity.id),
        &permission,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(permission))
}

#[utoipa::path(
    delete,
    path = "/api/permissions/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Permission ID")),
    responses(
        (status = 204, description = "Permission deleted"),
        (status = 404, description = "Permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let identity = state.authz.authorize(caller.0, EXCLUIR_PERMISSOES)?;
    let permission = fetch_permission(&state.pool, id).await?;

    sqlx::query("DELETE FROM permissions WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(identity.id),
        &permission,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
