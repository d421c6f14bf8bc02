use serde_json::Value;

#[test]
fn openapi_documents_patients_and_bearer_auth() -> anyhow::Result<()> {
    let doc = clinic_api::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let paths = v.get("paths").and_then(Value::as_object).expect("paths must exist");
    for path in ["/api/token", "/api/users/me", "/api/patients/{id}", "/api/profiles/{id}/permissions"] {
        assert!(paths.contains_key(path), "OpenAPI missing path '{path}'");
    }

    let props = v
        .pointer("/components/schemas/Patient/properties")
        .and_then(Value::as_object)
        .expect("components.schemas.Patient.properties must exist");
    for key in ["cpf", "birth_date", "clinic_id", "user_id"] {
        assert!(props.contains_key(key), "Patient schema missing '{key}'");
    }

    assert!(v.pointer("/components/securitySchemes/bearerAuth").is_some());
    assert_eq!(
        v.pointer("/servers/0/url").and_then(Value::as_str),
        Some("http://localhost:8000")
    );

    Ok(())
}
