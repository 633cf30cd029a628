//! Password hashing, session tokens and the login flow.
//!
//! Tokens are HS256 JWTs carrying `id`, `username`, `isAdmin`, `iat` and
//! `exp`. Nothing about a session is stored server side: a token is valid
//! until it expires, even if the admin flag is later revoked.

use std::sync::Arc;

use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MAX_TOKEN_TTL_SECS;
use crate::error::AuthError;
use crate::models::AdminIdentity;
use crate::storage::Storage;

/// Hashed once at startup and verified against when a username is unknown,
/// so both login failures cost one bcrypt verification.
const DUMMY_PASSWORD: &str = "skm-admissions-dummy-password";

/// Lowest cost bcrypt accepts; keeps hashing in tests fast.
#[cfg(test)]
pub(crate) const TEST_BCRYPT_COST: u32 = 4;

pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(password, cost)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password, hash)
}

/// Decoded session token payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionClaims {
    /// AdminIdentity id
    pub id: Uuid,
    pub username: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Signing material derived from the server secret.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(MAX_TOKEN_TTL_SECS as i64)),
        }
    }

    pub fn issue(&self, identity: &AdminIdentity) -> Result<String, AuthError> {
        self.issue_at(identity, Utc::now())
    }

    /// Sign a token as if issued at `issued_at`.
    pub fn issue_at(&self, identity: &AdminIdentity, issued_at: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = SessionClaims {
            id: identity.id,
            username: identity.username.clone(),
            is_admin: identity.is_admin,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AuthError::Signing)
    }

    /// Check signature and expiry. Pure computation, no I/O.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }
}

/// Verifies credentials against the credential store and mints tokens.
pub struct TokenIssuer {
    storage: Storage,
    keys: Arc<TokenKeys>,
    dummy_hash: String,
}

impl TokenIssuer {
    pub fn new(
        storage: Storage,
        keys: Arc<TokenKeys>,
        bcrypt_cost: u32,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            storage,
            keys,
            dummy_hash: hash_password(DUMMY_PASSWORD, bcrypt_cost)?,
        })
    }

    /// Exchange a username and password for a signed session token.
    ///
    /// Unknown usernames and wrong passwords both end in
    /// [`AuthError::InvalidCredentials`].
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let identity = self.storage.find_admin_by_username(username)?;

        let stored_hash = identity
            .as_ref()
            .map_or_else(|| self.dummy_hash.clone(), |i| i.password_hash.clone());
        let password = password.to_owned();
        let matches =
            tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash)).await??;

        match identity {
            Some(identity) if matches => {
                tracing::info!(username = %identity.username, is_admin = identity.is_admin, "admin login");
                self.keys.issue(&identity)
            }
            _ => {
                tracing::warn!(%username, "login rejected");
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}
