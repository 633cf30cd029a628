//! Access gate in front of every admin-only route.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::auth::{SessionClaims, TokenKeys};
use crate::error::AuthError;

const BEARER_PREFIX: &str = "Bearer ";

/// Validates presented session tokens. Holds only the verification key, so
/// it is cheap to clone into each router layer.
#[derive(Clone)]
pub struct AccessGate {
    keys: Arc<TokenKeys>,
}

impl AccessGate {
    pub fn new(keys: Arc<TokenKeys>) -> Self {
        Self { keys }
    }

    /// Verify the `Authorization` header and return the token's claims.
    /// A non-admin token passes this step.
    pub fn authenticate(&self, header: Option<&HeaderValue>) -> Result<SessionClaims, AuthError> {
        let token = bearer_token(header)?;
        self.keys.verify(token)
    }

    /// Authenticate, then insist on the admin claim.
    pub fn authorize_admin(&self, header: Option<&HeaderValue>) -> Result<SessionClaims, AuthError> {
        let claims = self.authenticate(header)?;
        require_admin(&claims)?;
        Ok(claims)
    }
}

/// Extract the token from a `Bearer <token>` header value.
pub fn bearer_token(header: Option<&HeaderValue>) -> Result<&str, AuthError> {
    let value = header
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::Unauthenticated)?;
    let token = value
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .ok_or(AuthError::Unauthenticated)?;
    if token.is_empty() {
        return Err(AuthError::Unauthenticated);
    }
    Ok(token)
}

pub fn require_admin(claims: &SessionClaims) -> Result<(), AuthError> {
    if claims.is_admin {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Middleware: reject the request before the handler runs unless it carries
/// a valid admin token. The claims are stored in the request extensions.
pub async fn admin_gate(
    State(gate): State<AccessGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let claims = gate
        .authorize_admin(req.headers().get(header::AUTHORIZATION))
        .map_err(|err| {
            match err {
                AuthError::Forbidden => tracing::warn!(path = %req.uri().path(), "non-admin token refused"),
                _ => tracing::debug!(path = %req.uri().path(), error = %err, "request rejected at gate"),
            }
            err
        })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
