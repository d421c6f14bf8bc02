mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

fn permission_names(profile: &Value) -> Vec<String> {
    profile["permissions"]
        .as_array()
        .map(|a| a.iter().filter_map(|p| p["name"].as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

async fn permission_id(t: &common::TestApp, name: &str) -> Result<String> {
    Ok(sqlx::query_scalar("SELECT id FROM permissions WHERE name = ?")
        .bind(name)
        .fetch_one(&t.pool)
        .await?)
}

#[tokio::test]
async fn granting_twice_leaves_one_membership() -> Result<()> {
    let t = common::setup().await?;
    let root = t.root().await?;

    let (status, profile) = t
        .send(Method::POST, "/api/profiles", Some(&root), Some(json!({ "name": "RECEPCAO" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{profile}");
    let profile_id = profile["id"].as_str().unwrap_or_default().to_string();
    let ler = permission_id(&t, "ler_pacientes").await?;

    for _ in 0..2 {
        let (status, _) = t
            .send(
                Method::POST,
                &format!("/api/profiles/{profile_id}/permissions"),
                Some(&root),
                Some(json!({ "permission_id": ler })),
            )
            .await?;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (_, profile) = t.send(Method::GET, &format!("/api/profiles/{profile_id}"), Some(&root), None).await?;
    assert_eq!(permission_names(&profile), vec!["ler_pacientes"]);

    let (status, _) = t
        .send(Method::DELETE, &format!("/api/profiles/{profile_id}/permissions/{ler}"), Some(&root), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, profile) = t.send(Method::GET, &format!("/api/profiles/{profile_id}"), Some(&root), None).await?;
    assert!(permission_names(&profile).is_empty());

    Ok(())
}

#[tokio::test]
async fn update_replaces_the_permission_set() -> Result<()> {
    let t = common::setup().await?;
    let root = t.root().await?;
    let ler = permission_id(&t, "ler_pacientes").await?;
    let criar = permission_id(&t, "criar_pacientes").await?;
    let excluir = permission_id(&t, "excluir_pacientes").await?;

    let (_, profile) = t
        .send(
            Method::POST,
            "/api/profiles",
            Some(&root),
            Some(json!({ "name": "RECEPCAO", "permission_ids": [ler, criar] })),
        )
        .await?;
    let profile_id = profile["id"].as_str().unwrap_or_default().to_string();
    assert_eq!(permission_names(&profile), vec!["criar_pacientes", "ler_pacientes"]);

    let (status, profile) = t
        .send(
            Method::PUT,
            &format!("/api/profiles/{profile_id}"),
            Some(&root),
            Some(json!({ "permission_ids": [excluir] })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["name"], "RECEPCAO");
    assert_eq!(permission_names(&profile), vec!["excluir_pacientes"]);

    let (status, _) = t
        .send(
            Method::PUT,
            &format!("/api/profiles/{profile_id}"),
            Some(&root),
            Some(json!({ "permission_ids": [uuid::Uuid::new_v4()] })),
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "unknown permission id");

    let (_, profile) = t.send(Method::GET, &format!("/api/profiles/{profile_id}"), Some(&root), None).await?;
    assert_eq!(permission_names(&profile), vec!["excluir_pacientes"], "failed update must not change the set");

    Ok(())
}

#[tokio::test]
async fn deleting_a_profile_orphans_its_identities() -> Result<()> {
    let t = common::setup().await?;
    let root = t.root().await?;
    let clinic = t.insert_clinic("Clínica Norte").await?;
    let ana = t.user_with("ana", Some("ATENDENTE"), Some(clinic), false).await?;

    let (status, _) = t.send(Method::GET, "/api/patients", Some(&ana), None).await?;
    assert_eq!(status, StatusCode::OK);

    let atendente: String = sqlx::query_scalar("SELECT id FROM profiles WHERE name = 'ATENDENTE'")
        .fetch_one(&t.pool)
        .await?;
    let (status, _) = t.send(Method::DELETE, &format!("/api/profiles/{atendente}"), Some(&root), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = t.send(Method::GET, "/api/patients", Some(&ana), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].as_str().unwrap_or_default().contains("no profile assigned"));

    let (status, me) = t.send(Method::GET, "/api/users/me", Some(&ana), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["profile"], Value::Null);

    Ok(())
}

#[tokio::test]
async fn permission_names_are_validated() -> Result<()> {
    let t = common::setup().await?;
    let root = t.root().await?;

    let (status, _) = t
        .send(Method::POST, "/api/permissions", Some(&root), Some(json!({ "name": "ler faturas" })))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, created) = t
        .send(
            Method::POST,
            "/api/permissions",
            Some(&root),
            Some(json!({ "name": "ler_relatorios", "description": "Permite visualizar relatórios." })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "ler_relatorios");

    let (status, _) = t
        .send(Method::POST, "/api/permissions", Some(&root), Some(json!({ "name": "ler_relatorios" })))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn admin_meta_permission_opens_everything_but_super_user_flag() -> Result<()> {
    let t = common::setup().await?;
    let gerente = t.user_with("gerente", Some("ADMIN"), None, false).await?;

    let (status, _) = t.send(Method::GET, "/api/profiles", Some(&gerente), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t
        .send(
            Method::POST,
            "/api/users",
            Some(&gerente),
            Some(json!({ "username": "outro", "password": "senha-segura", "is_superuser": true })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].as_str().unwrap_or_default().contains("super-user"));

    let root = t.root().await?;
    let (status, created) = t
        .send(
            Method::POST,
            "/api/users",
            Some(&root),
            Some(json!({ "username": "outro", "password": "senha-segura", "is_superuser": true })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["is_superuser"], true);

    Ok(())
}

#[tokio::test]
async fn super_user_accounts_are_out_of_reach_for_staff() -> Result<()> {
    let t = common::setup().await?;
    let clinic = t.insert_clinic("Clínica Norte").await?;
    let ana = t.user_with("ana", Some("ADMIN"), Some(clinic), false).await?;
    t.user_with("chefe", Some("ADMIN"), Some(clinic), true).await?;
    let chefe_id: String = sqlx::query_scalar("SELECT id FROM users WHERE username = 'chefe'")
        .fetch_one(&t.pool)
        .await?;

    for body in [
        json!({ "password": "tomado-123" }),
        json!({ "is_active": false }),
        json!({ "is_superuser": false }),
    ] {
        let (status, resp) = t
            .send(Method::PUT, &format!("/api/users/{chefe_id}"), Some(&ana), Some(body.clone()))
            .await?;
        assert_eq!(status, StatusCode::FORBIDDEN, "{body} -> {resp}");
    }

    let (status, _) = t.send(Method::DELETE, &format!("/api/users/{chefe_id}"), Some(&ana), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Untouched: the original password still works and the flags hold.
    let chefe = t.login("chefe", common::PASSWORD).await?;
    let (_, me) = t.send(Method::GET, "/api/users/me", Some(&chefe), None).await?;
    assert_eq!(me["is_superuser"], true);
    assert_eq!(me["is_active"], true);

    let (status, _) = t
        .send(
            Method::PUT,
            &format!("/api/users/{chefe_id}"),
            Some(&chefe),
            Some(json!({ "first_name": "Chefe" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "super-users may still edit super-users");

    Ok(())
}
