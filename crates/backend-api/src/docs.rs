use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::refresh_token,
        crate::routes::auth::me,
        crate::routes::auth::delete_me,
        crate::routes::auth::update_password,
        crate::routes::auth::forgot_password,
        crate::routes::auth::reset_password,
        crate::routes::auth::verify_email,
        crate::routes::auth::resend_verification,
        crate::routes::settings::get_settings,
        crate::routes::settings::update_settings,
        crate::routes::settings::reset_settings,
        crate::routes::settings::verification_status,
        crate::routes::settings::resend_verification,
        crate::routes::settings::test_smtp
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::error::ErrorBody,
            crate::routes::health::HealthResponse,
            crate::routes::auth::RegisterRequest,
            crate::routes::auth::LoginRequest,
            crate::routes::auth::ForgotPasswordRequest,
            crate::routes::auth::ResetPasswordRequest,
            crate::routes::auth::VerifyEmailRequest,
            crate::routes::auth::UpdatePasswordRequest,
            crate::routes::auth::DeleteAccountRequest,
            crate::routes::auth::UserResponse,
            crate::routes::auth::UserEnvelope,
            crate::routes::auth::SessionResponse,
            crate::routes::auth::MessageResponse,
            crate::routes::settings::PreferencesResponse,
            crate::routes::settings::UpdateSettingsRequest,
            crate::routes::settings::VerificationStatusResponse
        )
    ),
    tags(
        (name = "Health", description = "Service health endpoints"),
        (name = "Auth", description = "Account registration, sessions, and recovery"),
        (name = "Settings", description = "Per-user preferences and account utilities")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let schemes = &mut components.security_schemes;

        let mut scheme = SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer));
        if let SecurityScheme::Http(http) = &mut scheme {
            http.bearer_format = Some("Bearer".to_string());
        }

        schemes.insert("bearerAuth".to_string(), scheme);
    }
}
