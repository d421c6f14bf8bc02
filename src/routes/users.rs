//! Identity administration. Rows are tenant-bound through `users.clinic_id`.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::permissions::{ATUALIZAR_USUARIOS, CRIAR_USUARIOS, EXCLUIR_USUARIOS, LER_USUARIOS};
use crate::authz::{Caller, Denial, Identity, TenantScope};
use crate::db::seed::{insert_user, NewUser};
use crate::db::Page;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::user::{DbUser, User, UserCreateRequest, UserUpdateRequest, USER_COLUMNS};
use crate::routes::auth;
use crate::utils::{hash_password, utc_now};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/me", get(auth::me))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

fn select_users() -> QueryBuilder<'static, Sqlite> {
    QueryBuilder::new(format!(
        "SELECT {USER_COLUMNS} FROM users u LEFT JOIN profiles p ON p.id = u.profile_id WHERE "
    ))
}

pub(crate) async fn fetch_user_unscoped(pool: &SqlitePool, id: Uuid) -> AppResult<DbUser> {
    let mut qb = select_users();
    qb.push("u.id = ").push_bind(id.to_string());
    qb.build_query_as::<DbUser>()
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}

async fn fetch_user(pool: &SqlitePool, scope: &TenantScope, id: Uuid) -> AppResult<DbUser> {
    let mut qb = select_users();
    qb.push("u.id = ").push_bind(id.to_string()).push(" AND ");
    scope.push_filter(&mut qb, "u.clinic_id");
    qb.build_query_as::<DbUser>()
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}

fn guard_super_user_flag(caller: &Identity, requested: Option<bool>) -> AppResult<()> {
    if requested == Some(true) && !caller.super_user {
        tracing::info!(username = %caller.username, "refused to grant super-user status");
        return Err(AppError::forbidden(Denial::SuperUserRequired));
    }
    Ok(())
}

/// Super-user accounts can only be changed or removed by another super-user.
fn guard_super_user_target(caller: &Identity, target: &DbUser) -> AppResult<()> {
    if target.is_superuser && !caller.super_user {
        tracing::info!(username = %caller.username, target = %target.username, "refused to modify super-user");
        return Err(AppError::forbidden(Denial::SuperUserRequired));
    }
    Ok(())
}

async fn ensure_profile_exists(pool: &SqlitePool, profile_id: Uuid) -> AppResult<()> {
    let found: Option<String> = sqlx::query_scalar("SELECT id FROM profiles WHERE id = ?")
        .bind(profile_id.to_string())
        .fetch_optional(pool)
        .await?;
    found.map(|_| ()).ok_or_else(|| AppError::not_found("profile not found"))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 403, description = "Missing permission, foreign clinic or super-user flag"),
        (status = 409, description = "Username or email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Json(req): Json<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let identity = caller.identity();
    let scope = state.authz.authorize_scoped(identity, CRIAR_USUARIOS)?;
    guard_super_user_flag(identity, req.is_superuser)?;
    let clinic_id = scope.stamp(req.clinic_id)?;
    if let Some(profile_id) = req.profile_id {
        ensure_profile_exists(&state.pool, profile_id).await?;
    }

    let new_user = NewUser {
        email: req.email,
        first_name: req.first_name.unwrap_or_default(),
        last_name: req.last_name.unwrap_or_default(),
        profile_id: req.profile_id,
        clinic_id,
        is_active: req.is_active.unwrap_or(true),
        is_superuser: req.is_superuser.unwrap_or(false),
        ..NewUser::new(req.username, req.password)
    };
    let id = insert_user(&state.pool, &new_user).await?;

    let user: User = fetch_user_unscoped(&state.pool, id).await?.try_into()?;
    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(identity.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    params(Page),
    responses((status = 200, description = "Users visible to the caller", body = Vec<User>)),
    security(("bearerAuth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<User>>> {
    let scope = state.authz.authorize_scoped(caller.identity(), LER_USUARIOS)?;

    let mut qb = select_users();
    scope.push_filter(&mut qb, "u.clinic_id");
    qb.push(" ORDER BY u.username LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = qb.build_query_as::<DbUser>().fetch_all(&state.pool).await?;
    let users = rows.into_iter().map(User::try_from).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(users))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let scope = state.authz.authorize_scoped(caller.identity(), LER_USUARIOS)?;
    let user = fetch_user(&state.pool, &scope, id).await?.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 403, description = "Missing permission, foreign clinic or super-user flag"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    let identity = caller.identity();
    let scope = state.authz.authorize_scoped(identity, ATUALIZAR_USUARIOS)?;
    guard_super_user_flag(identity, req.is_superuser)?;

    let existing = fetch_user(&state.pool, &scope, id).await?;
    guard_super_user_target(identity, &existing)?;
    let clinic_id = match req.clinic_id {
        Some(requested) => scope.stamp(Some(requested))?.map(|c| c.to_string()),
        None => existing.clinic_id.clone(),
    };
    let profile_id = match req.profile_id {
        Some(profile_id) => {
            ensure_profile_exists(&state.pool, profile_id).await?;
            Some(profile_id.to_string())
        }
        None => existing.profile_id.clone(),
    };
    let password_hash = match req.password.as_deref() {
        Some(password) if !password.is_empty() => hash_password(password)?,
        _ => existing.password_hash.clone(),
    };

    sqlx::query(
        "UPDATE users SET email = ?, password_hash = ?, first_name = ?, last_name = ?, is_active = ?, \
         is_superuser = ?, profile_id = ?, clinic_id = ?, updated_at = ? WHERE id = ?",
    )
    .bind(req.email.or(existing.email.clone()))
    .bind(password_hash)
    .bind(req.first_name.unwrap_or_else(|| existing.first_name.clone()))
    .bind(req.last_name.unwrap_or_else(|| existing.last_name.clone()))
    .bind(req.is_active.unwrap_or(existing.is_active))
    .bind(req.is_superuser.unwrap_or(existing.is_superuser))
    .bind(profile_id)
    .bind(clinic_id)
    .bind(utc_now())
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    let old: User = existing.try_into()?;
    let user: User = fetch_user_unscoped(&state.pool, id).await?.try_into()?;
    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(identity.id),
        &user,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Missing permission or super-user target"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let identity = caller.identity();
    let scope = state.authz.authorize_scoped(identity, EXCLUIR_USUARIOS)?;
    let existing = fetch_user(&state.pool, &scope, id).await?;
    guard_super_user_target(identity, &existing)?;
    let user: User = existing.try_into()?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(identity.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
