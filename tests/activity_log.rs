mod common;

use std::time::Duration;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn profile_writes_land_in_the_hash_chain() -> Result<()> {
    let t = common::setup().await?;
    let root = t.root().await?;

    let (status, _) = t
        .send(Method::POST, "/api/profiles", Some(&root), Some(json!({ "name": "RECEPCAO" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let mut rows: Vec<(String, String)> = Vec::new();
    for _ in 0..50 {
        rows = sqlx::query_as("SELECT event_name, severity FROM activity_log")
            .fetch_all(&t.pool)
            .await?;
        if !rows.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(rows, vec![("profile.created".to_string(), "critical".to_string())]);

    let (prev, hash): (Option<String>, String) =
        sqlx::query_as("SELECT prev_hash, hash FROM event_store ORDER BY seq LIMIT 1")
            .fetch_one(&t.pool)
            .await?;
    assert!(prev.is_none());
    assert_eq!(hash.len(), 64);

    Ok(())
}
