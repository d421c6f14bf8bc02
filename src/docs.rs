use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::login,
		routes::auth::me,
		routes::clinics::create_clinic,
		routes::clinics::list_clinics,
		routes::clinics::list_public_clinics,
		routes::clinics::get_clinic,
		routes::clinics::update_clinic,
		routes::clinics::delete_clinic,
		routes::rbac::list_profiles,
		routes::rbac::create_profile,
		routes::rbac::get_profile,
		routes::rbac::update_profile,
		routes::rbac::delete_profile,
		routes::rbac::grant_permission,
		routes::rbac::revoke_permission,
		routes::rbac::list_permissions,
		routes::rbac::create_permission,
		routes::rbac::get_permission,
		routes::rbac::update_permission,
		routes::rbac::delete_permission,
		routes::users::create_user,
		routes::users::list_users,
		routes::users::get_user,
		routes::users::update_user,
		routes::users::delete_user,
		routes::patients::create_patient,
		routes::patients::list_patients,
		routes::patients::get_patient,
		routes::patients::update_patient,
		routes::patients::delete_patient,
		routes::appointments::create_appointment,
		routes::appointments::list_appointments,
		routes::appointments::get_appointment,
		routes::appointments::update_appointment,
		routes::appointments::delete_appointment
	),
	components(
		schemas(
			routes::health::HealthResponse,
			models::user::User,
			models::user::ProfileSummary,
			models::user::CurrentUser,
			models::user::LoginRequest,
			models::user::TokenResponse,
			models::user::UserCreateRequest,
			models::user::UserUpdateRequest,
			models::clinic::Clinic,
			models::clinic::ClinicCreateRequest,
			models::clinic::ClinicUpdateRequest,
			models::rbac::Profile,
			models::rbac::Permission,
			models::rbac::ProfileCreateRequest,
			models::rbac::ProfileUpdateRequest,
			models::rbac::PermissionCreateRequest,
			models::rbac::PermissionUpdateRequest,
			models::rbac::GrantPermissionRequest,
			models::patient::Patient,
			models::patient::PatientCreateRequest,
			models::patient::PatientUpdateRequest,
			models::appointment::Appointment,
			models::appointment::AppointmentStatus,
			models::appointment::AppointmentCreateRequest,
			models::appointment::AppointmentUpdateRequest
		)
	),
	modifiers(&SecurityAddon),
	tags(
		(name = "Health", description = "Liveness and database check"),
		(name = "Auth", description = "Token issue and current identity"),
		(name = "Clinics", description = "Clinic (tenant) management"),
		(name = "RBAC", description = "Profiles and permissions"),
		(name = "Users", description = "Identity administration"),
		(name = "Patients", description = "Patient records"),
		(name = "Appointments", description = "Appointment scheduling")
	)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Default::default);
		components.add_security_scheme(
			"bearerAuth",
			SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
		);
	}
}

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;
	ensure_servers(&mut doc, port);
	Ok(serde_json::from_value(doc)?)
}

/// `/api-docs/openapi.json` plus the Swagger UI at `/docs`.
pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);
	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{port}");

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn servers_entry_is_added_once() {
		let mut doc = json!({});
		ensure_servers(&mut doc, 8000);
		ensure_servers(&mut doc, 8000);
		assert_eq!(doc["servers"].as_array().map(Vec::len), Some(1));
	}
}
