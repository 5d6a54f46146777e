//! JWT issuing and validation for access tokens.

use crate::AuthError;
use chrono::{DateTime, Duration, Utc};
use gatehouse_config::AuthConfig;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Subject (public user id)
    pub exp: usize,  // Expiration time
    pub iat: usize,  // Issued at
    pub nbf: usize,  // Not before
    pub iss: String, // Issuer
    pub aud: String, // Audience
    pub jti: String, // JWT ID, referenced by the revocation denylist
    pub role: String,
}

/// A freshly signed token together with its decoded parts
#[derive(Debug, Clone)]
pub struct IssuedJwt {
    pub token: String,
    pub claims: Claims,
    pub expires_at: DateTime<Utc>,
}

/// JWT token manager
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    token_ttl: Duration,
}

impl JwtManager {
    /// Create a manager from the auth configuration
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_ref()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_ref()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            token_ttl: Duration::seconds(config.jwt_ttl_seconds as i64),
        }
    }

    /// Sign a new token for the subject
    pub fn generate_token(&self, subject: &str, role: &str) -> Result<IssuedJwt, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.token_ttl;

        let claims = Claims {
            sub: subject.to_string(),
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
            nbf: now.timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            role: role.to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenEncoding(e.to_string()))?;

        Ok(IssuedJwt {
            token,
            claims,
            expires_at,
        })
    }

    /// Validate signature, expiry, issuer, and audience. Every failure
    /// collapses to `Unauthorized`; the reason is only logged.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|err| {
                debug!(error = %err, "token validation failed");
                AuthError::Unauthorized
            })?;

        Ok(token_data.claims)
    }
}

/// Expiry instant recorded in the claims
pub(crate) fn expiry_of(claims: &Claims) -> Result<DateTime<Utc>, AuthError> {
    DateTime::from_timestamp(claims.exp as i64, 0).ok_or(AuthError::Unauthorized)
}
