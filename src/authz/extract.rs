use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};

use super::identity::Identity;
use crate::app::AppState;
use crate::errors::AppError;

/// Raw bearer credential from the `Authorization` header; empty when the
/// header is missing or uses another scheme.
pub fn bearer_credential(headers: &HeaderMap) -> &str {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("")
}

/// Authenticated, active caller. Permission checks happen in the handler,
/// which names the single permission it requires.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl Caller {
    pub fn identity(&self) -> &Identity {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = bearer_credential(&parts.headers);
        let identity = state.authz.resolve_active(raw).await?;
        Ok(Caller(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_credential_reads_bearer_scheme_only() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_credential(&headers), "");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_credential(&headers), "");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_credential(&headers), "abc.def.ghi");
    }
}
