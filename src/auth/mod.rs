use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::{entities::UserModel, errors::ServiceError};

/// Header carrying the verified user id to downstream services.
///
/// Everything behind the auth middleware trusts this header instead of
/// re-verifying the bearer token.
pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

/// JWT claims for storefront access tokens.
///
/// Token issuance belongs to the identity provider; this service only
/// verifies and reads. `issue_token` exists so tests and local tooling can
/// mint tokens with the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub admin: bool,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated identity attached to the request after verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub admin: bool,
}

impl TryFrom<Claims> for AuthenticatedUser {
    type Error = ServiceError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("invalid subject in token".to_string()))?;
        Ok(Self {
            id,
            username: claims.username,
            email: claims.email,
            admin: claims.admin,
        })
    }
}

/// Configuration for token verification
#[derive(Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub token_ttl: Duration,
    secret: String,
}

impl AuthConfig {
    pub fn new(secret: String, issuer: String, audience: String, token_ttl: Duration) -> Self {
        Self {
            issuer,
            audience,
            token_ttl,
            secret,
        }
    }
}

/// Verifies bearer tokens and exposes the claims they carry.
pub struct AuthService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Encodes an access token for the given user.
    pub fn issue_token(&self, user: &UserModel) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            admin: user.is_admin,
            iat: now,
            exp: now + self.config.token_ttl.as_secs() as i64,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Unauthorized(format!("failed to encode token: {}", e)))
    }

    /// Decodes and validates a bearer token, returning its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.clone()]);
        validation.set_audience(&[self.config.audience.clone()]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| ServiceError::Unauthorized("invalid or expired token".to_string()))
    }
}

/// Bearer-token middleware for protected routes.
///
/// On success the verified identity is inserted into request extensions and
/// the `x-user-id` header, replacing anything the client may have sent.
pub async fn auth_middleware(mut request: Request, next: Next) -> Result<Response, ServiceError> {
    let auth_service = request
        .extensions()
        .get::<Arc<AuthService>>()
        .cloned()
        .ok_or(ServiceError::InternalServerError)?;

    let token = bearer_token(&request)
        .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

    let claims = auth_service.validate_token(&token)?;
    let user = AuthenticatedUser::try_from(claims)?;

    let id_value = HeaderValue::from_str(&user.id.to_string())
        .map_err(|_| ServiceError::InternalServerError)?;
    request.headers_mut().insert(USER_ID_HEADER, id_value);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("authentication required".to_string()))
    }
}

/// Extractor gating administrative routes.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.admin {
            return Err(ServiceError::Forbidden(
                "administrator access required".to_string(),
            ));
        }
        Ok(AdminUser(user))
    }
}
