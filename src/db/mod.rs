use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppError;

pub mod identity_store;
pub mod provisioning;
pub mod seed;

pub use identity_store::SqliteIdentityStore;

pub async fn init() -> anyhow::Result<SqlitePool> {
	let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;

	let options = SqliteConnectOptions::from_str(&database_url)
		.context("invalid DATABASE_URL")?
		.create_if_missing(true)
		.foreign_keys(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(10)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(10))
		.connect_with(options)
		.await
		.context("failed to connect to database")?;

	sqlx::migrate!()
		.run(&pool)
		.await
		.context("failed to run migrations")?;

	Ok(pool)
}

/// Ids are stored as hyphenated TEXT.
pub fn parse_uuid(value: &str, column: &str) -> Result<Uuid, AppError> {
	Uuid::parse_str(value).map_err(|e| AppError::internal(format!("invalid uuid in {column}: {e}")))
}

pub fn parse_opt_uuid(value: Option<&str>, column: &str) -> Result<Option<Uuid>, AppError> {
	value.map(|v| parse_uuid(v, column)).transpose()
}

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 1000;

/// `skip`/`limit` query parameters shared by list endpoints.
#[derive(Debug, Default, Clone, Copy, serde::Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Page {
	pub skip: Option<i64>,
	pub limit: Option<i64>,
}

impl Page {
	pub fn offset(&self) -> i64 {
		self.skip.unwrap_or(0).max(0)
	}

	pub fn limit(&self) -> i64 {
		self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
	}
}

/// Single-connection in-memory database with migrations applied.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
	let options = SqliteConnectOptions::from_str("sqlite::memory:")
		.expect("memory url")
		.foreign_keys(true);
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.connect_with(options)
		.await
		.expect("memory pool");
	sqlx::migrate!().run(&pool).await.expect("migrations");
	pool
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn page_defaults_and_clamps() {
		let page = Page::default();
		assert_eq!(page.offset(), 0);
		assert_eq!(page.limit(), DEFAULT_PAGE_SIZE);

		let page = Page { skip: Some(-5), limit: Some(50_000) };
		assert_eq!(page.offset(), 0);
		assert_eq!(page.limit(), MAX_PAGE_SIZE);
	}

	#[test]
	fn parse_uuid_reports_column() {
		let err = parse_uuid("nope", "patients.id").unwrap_err();
		assert!(err.to_string().contains("patients.id"));
		assert!(parse_opt_uuid(None, "x").unwrap().is_none());
	}
}
