mod common;

use anyhow::Result;
use axum::http::{header, Method, StatusCode};
use chrono::Duration;
use serde_json::json;

use clinic_api::jwt::{CredentialCodec, JwtConfig};

#[tokio::test]
async fn login_rejects_bad_credentials_with_challenge() -> Result<()> {
    let t = common::setup().await?;
    t.root().await?;

    let (status, headers, body) = t
        .send_full(
            Method::POST,
            "/api/token",
            None,
            Some(json!({ "username": "root", "password": "wrong-password" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers.get(header::WWW_AUTHENTICATE).and_then(|v| v.to_str().ok()), Some("Bearer"));
    assert_eq!(body["message"], "incorrect username or password");

    let (status, body) = t
        .send(
            Method::POST,
            "/api/token",
            None,
            Some(json!({ "username": "nobody", "password": "whatever-123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "incorrect username or password");

    let last_login: Option<String> = sqlx::query_scalar("SELECT last_login FROM users WHERE username = 'root'")
        .fetch_one(&t.pool)
        .await?;
    assert!(last_login.is_some(), "successful login must stamp last_login");

    Ok(())
}

#[tokio::test]
async fn unusable_credentials_are_unauthenticated() -> Result<()> {
    let t = common::setup().await?;
    t.root().await?;

    let (status, headers, _) = t.send_full(Method::GET, "/api/patients", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "missing credential");
    assert!(headers.get(header::WWW_AUTHENTICATE).is_some());

    let foreign = JwtConfig::new("another-secret", 1).issue("root", None)?;
    let (status, _) = t.send(Method::GET, "/api/patients", Some(&foreign), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "wrong signature");

    let expired = JwtConfig::new("test-secret", 1).issue("root", Some(Duration::hours(-2)))?;
    let (status, _) = t.send(Method::GET, "/api/patients", Some(&expired), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "expired");

    let ghost = JwtConfig::new("test-secret", 1).issue("ghost", None)?;
    let (status, body) = t.send(Method::GET, "/api/patients", Some(&ghost), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "unknown subject");
    assert_eq!(body["message"], "could not validate credentials");

    Ok(())
}

#[tokio::test]
async fn inactive_identity_is_bad_request_even_with_full_access() -> Result<()> {
    let t = common::setup().await?;
    let token = t.user_with("desligado", Some("ADMIN"), None, false).await?;
    sqlx::query("UPDATE users SET is_active = 0 WHERE username = 'desligado'")
        .execute(&t.pool)
        .await?;

    let (status, body) = t.send(Method::GET, "/api/patients", Some(&token), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "inactive user");

    let (status, _) = t.send(Method::GET, "/api/users/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn identity_without_profile_is_forbidden() -> Result<()> {
    let t = common::setup().await?;
    let token = t.user_with("semperfil", None, None, false).await?;

    let (status, body) = t.send(Method::GET, "/api/patients", Some(&token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].as_str().unwrap_or_default().contains("no profile assigned"));

    // No permission is needed to read oneself.
    let (status, body) = t.send(Method::GET, "/api/users/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "semperfil");
    assert_eq!(body["permissions"], json!([]));

    Ok(())
}

#[tokio::test]
async fn missing_permission_is_named_in_the_denial() -> Result<()> {
    let t = common::setup().await?;
    let clinic = t.insert_clinic("Clínica Sul").await?;
    let token = t.user_with("recepcao", Some("ATENDENTE"), Some(clinic), false).await?;

    let (status, body) = t.send(Method::GET, "/api/users", Some(&token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "forbidden: missing permission: ler_usuarios");

    let (status, body) = t.send(Method::GET, "/api/users/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let permissions: Vec<&str> = body["permissions"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    assert!(permissions.contains(&"ler_pacientes"));
    assert!(!permissions.contains(&"excluir_pacientes"));
    assert_eq!(body["profile"]["name"], "ATENDENTE");

    Ok(())
}
