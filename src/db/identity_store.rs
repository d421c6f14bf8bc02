use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

use super::{parse_opt_uuid, parse_uuid};
use crate::authz::{Identity, IdentityStore, Profile};
use crate::errors::AppResult;

#[derive(Debug, FromRow)]
struct IdentityRow {
	id: String,
	username: String,
	is_active: bool,
	is_superuser: bool,
	clinic_id: Option<String>,
	profile_id: Option<String>,
	profile_name: Option<String>,
}

/// `IdentityStore` over the `users` table. Profile and permission names are
/// loaded in the same call.
#[derive(Clone)]
pub struct SqliteIdentityStore {
	pool: SqlitePool,
}

impl SqliteIdentityStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl IdentityStore for SqliteIdentityStore {
	async fn find_by_subject(&self, subject: &str) -> AppResult<Option<Identity>> {
		let row = sqlx::query_as::<_, IdentityRow>(
			"SELECT u.id, u.username, u.is_active, u.is_superuser, u.clinic_id, \
			        u.profile_id, p.name AS profile_name \
			 FROM users u LEFT JOIN profiles p ON p.id = u.profile_id \
			 WHERE u.username = ?",
		)
		.bind(subject)
		.fetch_optional(&self.pool)
		.await?;

		let Some(row) = row else {
			return Ok(None);
		};

		let mut identity = Identity::new(parse_uuid(&row.id, "users.id")?, row.username);
		identity.active = row.is_active;
		identity.super_user = row.is_superuser;
		identity.clinic_id = parse_opt_uuid(row.clinic_id.as_deref(), "users.clinic_id")?;

		if let (Some(profile_id), Some(profile_name)) = (row.profile_id, row.profile_name) {
			let permissions = permission_names(&self.pool, &profile_id).await?;
			let profile = Profile::new(parse_uuid(&profile_id, "users.profile_id")?, profile_name)
				.with_permissions(permissions);
			identity = identity.with_profile(profile);
		}

		Ok(Some(identity))
	}
}

/// Names of the permissions granted to a profile.
pub async fn permission_names(pool: &SqlitePool, profile_id: &str) -> AppResult<HashSet<String>> {
	let names: Vec<String> = sqlx::query_scalar(
		"SELECT perm.name FROM profile_permissions pp \
		 JOIN permissions perm ON perm.id = pp.permission_id \
		 WHERE pp.profile_id = ?",
	)
	.bind(profile_id)
	.fetch_all(pool)
	.await?;

	Ok(names.into_iter().collect())
}
