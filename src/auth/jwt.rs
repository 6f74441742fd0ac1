use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{
    auth::claims::{Claims, TokenContext},
    config::JwtConfig,
    error::ApiError,
};

#[derive(Debug, thiserror::Error)]
#[error("token error: {0}")]
pub struct TokenError(#[from] jsonwebtoken::errors::Error);

/// Issues signed session tokens.
pub trait TokenIssuer: Send + Sync {
    /// An empty `audience` selects the issuer's default audience.
    fn sign(&self, ctx: &TokenContext, audience: &str) -> Result<String, TokenError>;
}

/// Longest lifetime a token may be issued with.
pub const MAX_TTL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs(u64::try_from(cfg.ttl_minutes).unwrap_or(0).saturating_mul(60))
                .min(MAX_TTL),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.validate_nbf = true;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = data.claims.user_id, "jwt verified");
        Ok(data.claims)
    }
}

/// Builds the claims for `ctx` and signs them with `keys`.
pub fn sign_token(keys: &JwtKeys, ctx: &TokenContext, audience: &str) -> Result<String, TokenError> {
    let now = OffsetDateTime::now_utc();
    let ttl = i64::try_from(keys.ttl.as_secs()).unwrap_or(i64::MAX);
    let exp = now.saturating_add(TimeDuration::seconds(ttl));
    let aud = if audience.is_empty() {
        keys.audience.clone()
    } else {
        audience.to_owned()
    };
    let claims = Claims {
        user_id: ctx.user_id,
        username: ctx.username.clone(),
        uuid: ctx.uuid.clone(),
        email: ctx.email.clone(),
        is_admin: ctx.is_admin,
        iat: now.unix_timestamp() as usize,
        nbf: now.unix_timestamp() as usize,
        exp: exp.unix_timestamp() as usize,
        iss: keys.issuer.clone(),
        aud,
    };
    let token = encode(&Header::default(), &claims, &keys.encoding)?;
    debug!(user_id = ctx.user_id, "jwt signed");
    Ok(token)
}

impl TokenIssuer for JwtKeys {
    fn sign(&self, ctx: &TokenContext, audience: &str) -> Result<String, TokenError> {
        sign_token(self, ctx, audience)
    }
}

/// Claims of a verified bearer token.
pub struct AuthUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;

        match keys.verify(token) {
            Ok(claims) => Ok(AuthUser(claims)),
            Err(e) => {
                warn!(error = %e, "invalid or expired token");
                Err(ApiError::Unauthorized("Invalid or expired token".into()))
            }
        }
    }
}
