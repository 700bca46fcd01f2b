//! Session verification. Tokens are issued by the hosted auth service as
//! HS256 JWTs; this server only checks them.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppError;

#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
    cookie_name: String,
}

impl SessionVerifier {
    pub fn new(secret: &str, audience: &str, cookie_name: impl Into<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            cookie_name: cookie_name.into(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims)
    }

    /// Bearer header first, then the session cookie.
    pub fn token_from_headers<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        bearer.or_else(|| {
            headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|cookies| cookies.split(';'))
                .filter_map(|pair| pair.trim().split_once('='))
                .find(|(name, _)| *name == self.cookie_name)
                .map(|(_, token)| token)
                .filter(|token| !token.is_empty())
        })
    }
}

/// The authenticated user behind a request. Extracting it rejects the
/// request with 401 when no valid session is present; use
/// `Option<Actor>` for routes that only personalize.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = state
            .sessions
            .token_from_headers(&parts.headers)
            .ok_or_else(AppError::unauthorized)?;

        let claims = state.sessions.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected session token");
            AppError::unauthorized()
        })?;

        let actor = Actor {
            id: claims.sub,
            email: claims.email.unwrap_or_default(),
        };
        state.store.ensure_user(actor.id, &actor.email).await?;

        Ok(actor)
    }
}
