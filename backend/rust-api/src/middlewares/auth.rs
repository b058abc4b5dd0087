use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::services::AppState;

/// Token issuance lives in a separate admin/auth system; this service only
/// validates what it is handed and yields the authenticated-admin fact.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String,  // admin user id
    pub role: String, // must be "admin" for the review surface
    pub exp: usize,   // expiration timestamp
    pub iat: usize,   // issued at timestamp
}

#[derive(Debug)]
pub enum AuthError {
    InvalidToken,
    ExpiredToken,
    MissingToken,
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::ExpiredToken => write!(f, "Token expired"),
            AuthError::MissingToken => write!(f, "Missing authorization token"),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
        }
    }
}

impl std::error::Error for AuthError {}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: JwtClaims) -> Result<String, AuthError> {
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let validation = Validation::default();

        decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                if e.to_string().contains("ExpiredSignature") {
                    AuthError::ExpiredToken
                } else if e.to_string().contains("InvalidSignature") {
                    AuthError::InvalidSignature
                } else {
                    AuthError::InvalidToken
                }
            })
    }
}

/// Bearer-token check for the review surface: validates the JWT and stores
/// the claims for handlers (reviewer identity ends up on decisions).
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let jwt_service = JwtService::new(&state.config.jwt_secret);
    let claims = jwt_service.validate_token(token).map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    tracing::debug!("Authenticated user: {} (role: {})", claims.sub, claims.role);

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

pub async fn admin_guard_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    let claims = request.extensions().get::<JwtClaims>();
    if let Some(claims) = claims {
        if claims.role == "admin" {
            return Ok(next.run(request).await);
        }
    }
    tracing::warn!("Access denied: admin role required");
    Err(StatusCode::FORBIDDEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: &str) -> JwtClaims {
        JwtClaims {
            sub: "admin-1".to_string(),
            role: role.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
            iat: chrono::Utc::now().timestamp() as usize,
        }
    }

    #[test]
    fn test_jwt_generation_and_validation() {
        let service = JwtService::new("test-secret");

        let token = service.generate_token(claims("admin")).unwrap();
        let validated = service.validate_token(&token).unwrap();

        assert_eq!(validated.sub, "admin-1");
        assert_eq!(validated.role, "admin");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let issuer = JwtService::new("secret-a");
        let verifier = JwtService::new("secret-b");

        let token = issuer.generate_token(claims("admin")).unwrap();
        assert!(verifier.validate_token(&token).is_err());
    }
}
