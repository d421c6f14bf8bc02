use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};

use crate::errors::AppError;

/// Signed, time-limited bearer credential carrying a subject identifier.
pub trait CredentialCodec: Send + Sync {
    /// Issue a credential for `subject`. `ttl` overrides the configured lifetime.
    fn issue(&self, subject: &str, ttl: Option<Duration>) -> Result<String, AppError>;

    /// Verify signature and expiry and return the decoded claims.
    fn parse(&self, credential: &str) -> Result<Claims, AppError>;
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<Vec<u8>>, exp_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            exp_hours,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        if secret.trim().is_empty() {
            return Err(AppError::configuration("JWT_SECRET must not be empty"));
        }
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        Ok(Self::new(secret.into_bytes(), exp_hours))
    }
}

impl CredentialCodec for JwtConfig {
    fn issue(&self, subject: &str, ttl: Option<Duration>) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = now + ttl.unwrap_or_else(|| Duration::hours(self.exp_hours));

        let claims = Claims {
            sub: Some(subject.to_string()),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::internal(format!("failed to sign credential: {err}")))
    }

    fn parse(&self, credential: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(credential, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::invalid_credential(err.to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    /// Username of the identity; optional on the wire so a token without it
    /// is rejected by the resolver rather than by deserialization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub exp: i64,
    pub iat: i64,
}
