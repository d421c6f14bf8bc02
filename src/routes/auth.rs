use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::Caller;
use crate::errors::{AppError, AppResult};
use crate::jwt::CredentialCodec;
use crate::models::user::{CurrentUser, LoginRequest, TokenResponse, User};
use crate::routes::users::fetch_user_unscoped;
use crate::utils::{utc_now, verify_password};

const BAD_LOGIN: &str = "incorrect username or password";

pub fn routes() -> Router<AppState> {
    Router::new().route("/token", post(login))
}

#[utoipa::path(
    post,
    path = "/api/token",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 401, description = "Incorrect username or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT id, password_hash FROM users WHERE username = ?")
            .bind(&payload.username)
            .fetch_optional(&state.pool)
            .await?;

    let Some((id, password_hash)) = row else {
        tracing::info!(username = %payload.username, "login for unknown username");
        return Err(AppError::unauthenticated(BAD_LOGIN));
    };

    if !verify_password(&payload.password, &password_hash)? {
        tracing::info!(username = %payload.username, "login with wrong password");
        return Err(AppError::unauthenticated(BAD_LOGIN));
    }

    sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(utc_now())
        .bind(&id)
        .execute(&state.pool)
        .await?;

    let access_token = state.jwt.issue(&payload.username, None)?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = CurrentUser),
        (status = 400, description = "Inactive user"),
        (status = 401, description = "Could not validate credentials")
    ),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, caller: Caller) -> AppResult<Json<CurrentUser>> {
    let identity = caller.identity();
    let user: User = fetch_user_unscoped(&state.pool, identity.id).await?.try_into()?;

    let mut permissions: Vec<String> = identity
        .profile
        .as_ref()
        .map(|p| p.permissions.iter().cloned().collect())
        .unwrap_or_default();
    permissions.sort();

    Ok(Json(CurrentUser { user, permissions }))
}
