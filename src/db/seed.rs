//! Catalogue seeding and identity creation shared by the CLI, the REST
//! handlers and the tests.

use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::authz::catalogue::{catalogue, default_profiles};
use crate::authz::PermissionName;
use crate::errors::{AppError, AppResult};
use crate::utils::{hash_password, utc_now};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
	pub permissions: u64,
	pub profiles: u64,
	pub grants: u64,
}

/// Insert the permission catalogue and the default profiles. Rows that
/// already exist are left alone, so running twice changes nothing.
pub async fn seed_catalogue(pool: &SqlitePool) -> AppResult<SeedReport> {
	let mut report = SeedReport::default();
	let now = utc_now();
	let mut tx = pool.begin().await?;

	for entry in catalogue() {
		let name = PermissionName::parse(&entry.name)?;
		report.permissions += sqlx::query(
			"INSERT OR IGNORE INTO permissions (id, name, description, created_at, updated_at) \
			 VALUES (?, ?, ?, ?, ?)",
		)
		.bind(Uuid::new_v4().to_string())
		.bind(name.as_str())
		.bind(&entry.description)
		.bind(now)
		.bind(now)
		.execute(&mut *tx)
		.await?
		.rows_affected();
	}

	for (profile, permissions) in default_profiles() {
		report.profiles += sqlx::query(
			"INSERT OR IGNORE INTO profiles (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
		)
		.bind(Uuid::new_v4().to_string())
		.bind(profile)
		.bind(now)
		.bind(now)
		.execute(&mut *tx)
		.await?
		.rows_affected();

		for permission in permissions {
			report.grants += sqlx::query(
				"INSERT OR IGNORE INTO profile_permissions (profile_id, permission_id, created_at) \
				 SELECT pr.id, pe.id, ? FROM profiles pr, permissions pe \
				 WHERE pr.name = ? AND pe.name = ?",
			)
			.bind(now)
			.bind(profile)
			.bind(&permission)
			.execute(&mut *tx)
			.await?
			.rows_affected();
		}
	}

	tx.commit().await?;
	tracing::info!(
		permissions = report.permissions,
		profiles = report.profiles,
		grants = report.grants,
		"catalogue seeded"
	);
	Ok(report)
}

pub async fn profile_id_by_name<'e, E>(executor: E, name: &str) -> AppResult<Option<Uuid>>
where
	E: Executor<'e, Database = Sqlite>,
{
	let id: Option<String> = sqlx::query_scalar("SELECT id FROM profiles WHERE name = ?")
		.bind(name)
		.fetch_optional(executor)
		.await?;
	id.map(|id| super::parse_uuid(&id, "profiles.id")).transpose()
}

/// Fields of a new identity. The password is hashed on insert.
#[derive(Debug, Clone)]
pub struct NewUser {
	pub username: String,
	pub password: String,
	pub email: Option<String>,
	pub first_name: String,
	pub last_name: String,
	pub profile_id: Option<Uuid>,
	pub clinic_id: Option<Uuid>,
	pub is_active: bool,
	pub is_superuser: bool,
}

impl NewUser {
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			username: username.into(),
			password: password.into(),
			email: None,
			first_name: String::new(),
			last_name: String::new(),
			profile_id: None,
			clinic_id: None,
			is_active: true,
			is_superuser: false,
		}
	}
}

pub async fn insert_user<'e, E>(executor: E, user: &NewUser) -> AppResult<Uuid>
where
	E: Executor<'e, Database = Sqlite>,
{
	if user.username.trim().is_empty() {
		return Err(AppError::bad_request("username must not be empty"));
	}
	let password_hash = hash_password(&user.password)?;
	let id = Uuid::new_v4();
	let now = utc_now();

	sqlx::query(
		"INSERT INTO users (id, username, email, password_hash, first_name, last_name, is_active, \
		 is_superuser, profile_id, clinic_id, created_at, updated_at) \
		 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
	)
	.bind(id.to_string())
	.bind(&user.username)
	.bind(&user.email)
	.bind(password_hash)
	.bind(&user.first_name)
	.bind(&user.last_name)
	.bind(user.is_active)
	.bind(user.is_superuser)
	.bind(user.profile_id.map(|id| id.to_string()))
	.bind(user.clinic_id.map(|id| id.to_string()))
	.bind(now)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(id)
}

pub async fn create_user(pool: &SqlitePool, user: NewUser) -> AppResult<Uuid> {
	insert_user(pool, &user).await
}

/// Super-user with the `ADMIN` profile, as created by `cli create-admin`.
pub async fn create_admin(
	pool: &SqlitePool,
	username: &str,
	password: &str,
	email: Option<String>,
) -> AppResult<Uuid> {
	let profile_id = profile_id_by_name(pool, "ADMIN").await?;
	if profile_id.is_none() {
		tracing::warn!("ADMIN profile missing, run `seed` first");
	}

	create_user(
		pool,
		NewUser {
			email,
			first_name: "Admin".to_string(),
			profile_id,
			is_superuser: true,
			..NewUser::new(username, password)
		},
	)
	.await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::test_pool;

	#[tokio::test]
	async fn seeding_twice_is_a_no_op() {
		let pool = test_pool().await;
		let first = seed_catalogue(&pool).await.unwrap();
		assert!(first.permissions > 0);
		assert_eq!(first.profiles, 5);

		let second = seed_catalogue(&pool).await.unwrap();
		assert_eq!(second, SeedReport::default());

		let admin_grants: i64 = sqlx::query_scalar(
			"SELECT COUNT(*) FROM profile_permissions pp JOIN profiles p ON p.id = pp.profile_id \
			 WHERE p.name = 'ADMIN'",
		)
		.fetch_one(&pool)
		.await
		.unwrap();
		assert_eq!(admin_grants as u64, first.permissions);
	}

	#[tokio::test]
	async fn duplicate_username_is_a_conflict() {
		let pool = test_pool().await;
		create_user(&pool, NewUser::new("ana", "senha-segura")).await.unwrap();
		let err = create_user(&pool, NewUser::new("ana", "outra-senha")).await.unwrap_err();
		assert!(matches!(err, AppError::Conflict(_)));
	}

	#[tokio::test]
	async fn admin_is_super_user_with_admin_profile() {
		let pool = test_pool().await;
		seed_catalogue(&pool).await.unwrap();
		create_admin(&pool, "root", "senha-segura", None).await.unwrap();

		let (superuser, profile): (bool, String) = sqlx::query_as(
			"SELECT u.is_superuser, p.name FROM users u JOIN profiles p ON p.id = u.profile_id \
			 WHERE u.username = 'root'",
		)
		.fetch_one(&pool)
		.await
		.unwrap();
		assert!(superuser);
		assert_eq!(profile, "ADMIN");
	}
}
