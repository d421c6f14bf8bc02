use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{Authorizer, DefaultPolicyEvaluator, IdentityResolver};
use crate::db::SqliteIdentityStore;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{appointments, auth, clinics, health, patients, rbac, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub authz: Authorizer,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        let jwt = Arc::new(jwt);
        let resolver = IdentityResolver::new(
            jwt.clone(),
            Arc::new(SqliteIdentityStore::new(pool.clone())),
        );
        let authz = Authorizer::new(resolver, Arc::new(DefaultPolicyEvaluator::new()));

        Self {
            pool,
            jwt,
            authz,
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    Ok(router(AppState::new(pool, jwt_config, event_bus)))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/health", get(health::health))
        .merge(auth::routes())
        .nest("/clinics", clinics::routes())
        .route("/clinics-public", get(clinics::list_public_clinics))
        .merge(rbac::routes())
        .nest("/users", users::routes())
        .nest("/patients", patients::routes())
        .nest("/appointments", appointments::routes());

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
