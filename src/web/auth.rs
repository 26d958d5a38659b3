//! Bearer-token identity for inbound requests.
//!
//! Tokens travel in the `Authorization` header using the Bearer scheme and are
//! verified as HS256 JWTs. A request without the header is served anonymously.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use super::error::WebError;
use crate::context::{CancelOnDrop, RequestContext};
use crate::identity::Claims;

#[derive(Debug, Error, PartialEq)]
pub enum TokenError {
    #[error("invalid authorization header format")]
    InvalidHeaderFormat,
    #[error("invalid token scheme (expected Bearer)")]
    InvalidScheme,
    #[error("token expired")]
    Expired,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("invalid token issuer")]
    InvalidIssuer,
    #[error("token validation failed: {0}")]
    Invalid(String),
}

impl From<TokenError> for WebError {
    fn from(err: TokenError) -> Self {
        WebError::Unauthorized(err.to_string())
    }
}

#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: impl AsRef<[u8]>, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| {
                debug!(subject = %data.claims.subject, "token verified");
                data.claims
            })
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
                _ => TokenError::Invalid(err.to_string()),
            })
    }
}

/// Returns the bearer token, `None` when no `Authorization` header is sent.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, TokenError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| TokenError::InvalidHeaderFormat)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(TokenError::InvalidScheme)?
        .trim();
    if token.is_empty() {
        return Err(TokenError::InvalidHeaderFormat);
    }
    Ok(Some(token))
}

/// Builds the [`RequestContext`] for the request and stores it in the
/// request extensions.
///
/// The context is cancelled when the request future completes or is dropped.
pub async fn request_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, WebError> {
    let claims = match &state.verifier {
        Some(verifier) => match bearer_token(request.headers())? {
            Some(token) => Some(verifier.verify(token).inspect_err(|err| {
                warn!(error = %err, "rejected bearer token");
            })?),
            None => None,
        },
        None => None,
    };

    let mut ctx = RequestContext::background().with_optional_claims(claims);
    if let Some(collaborators) = &state.collaborators {
        ctx = ctx.with_collaborators(Arc::clone(collaborators));
    }
    let (ctx, handle) = ctx.cancellable();
    let _guard = CancelOnDrop(handle);

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}
