//! Bearer-token plumbing (HS256).
//!
//! Deliberately thin: claims carry the account identity and an admin flag,
//! nothing else. Signature verification is delegated to `jsonwebtoken`;
//! time-window checks are deterministic and separately testable.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cubemerch_accounts::AccountId;

/// JWT claims model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the authenticated account.
    pub sub: AccountId,

    /// Admin surfaces (metrics, lanes, catalog CRUD) require this flag.
    #[serde(default)]
    pub admin: bool,

    /// Issued-at timestamp.
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("token could not be decoded")]
    Malformed,
}

/// Deterministically validate JWT claims against a reference time.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Token validator boundary (transport-agnostic).
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HS256 validator over a shared secret.
pub struct Hs256JwtValidator {
    key: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            key: DecodingKey::from_secret(&secret),
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        // Time-window checks run through `validate_claims` below so they
        // stay deterministic; disable the library's clock-based check.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &validation)
            .map_err(|_| TokenValidationError::Malformed)?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}
