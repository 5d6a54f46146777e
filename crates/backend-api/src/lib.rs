mod docs;
mod error;
mod state;
mod util;

pub mod routes;

pub use error::{ApiError, ErrorBody, ErrorResponse};
pub use state::{ApiConfig, AppState, RateLimiter};

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue,
    },
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.api_config().cors_origin.as_deref());

    Router::new()
        .route("/health", get(routes::health::health_check))
        // Account lifecycle
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/refresh-token", post(routes::auth::refresh_token))
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/auth/me", delete(routes::auth::delete_me))
        .route(
            "/api/auth/update-password",
            post(routes::auth::update_password),
        )
        // Recovery and verification
        .route(
            "/api/auth/forgot-password",
            post(routes::auth::forgot_password),
        )
        .route(
            "/api/auth/reset-password",
            post(routes::auth::reset_password),
        )
        .route("/api/auth/verify-email", post(routes::auth::verify_email))
        .route(
            "/api/auth/resend-verification",
            post(routes::auth::resend_verification),
        )
        // Settings surface
        .route("/api/settings", get(routes::settings::get_settings))
        .route("/api/settings", put(routes::settings::update_settings))
        .route("/api/settings", delete(routes::settings::reset_settings))
        .route(
            "/api/settings/email-verification",
            get(routes::settings::verification_status),
        )
        .route(
            "/api/settings/email-verification",
            post(routes::settings::resend_verification),
        )
        .route("/api/settings/test-smtp", post(routes::settings::test_smtp))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .layer(cors)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    match origin.and_then(|value| value.parse::<HeaderValue>().ok()) {
        Some(origin) => layer.allow_origin(origin),
        None => layer.allow_origin(Any),
    }
}
