//! Stateless session tokens: compact JWS, HS256.
//!
//! The MAC is checked before the payload is decoded, so claims are never read
//! from an unverified token.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Duration;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use super::{permissions::Role, principal::Campus, AuthError};
use crate::clock::SharedClock;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_KEY_BYTES: usize = 32;
pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 8 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Decoded, verified session claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub role: Role,
    pub campus: Campus,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    /// `username@campus`, the actor name used in audit records.
    #[must_use]
    pub fn actor(&self) -> String {
        format!("{}@{}", self.sub, self.campus)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("missing subject")]
    MissingSubject,
    #[error("token expired")]
    Expired,
    #[error("signing key must be at least {MIN_KEY_BYTES} bytes")]
    WeakKey,
    #[error("token lifetime out of range")]
    TtlOutOfRange,
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::Expired,
            TokenError::WeakKey | TokenError::TtlOutOfRange => Self::Internal(err.to_string()),
            _ => Self::InvalidToken,
        }
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Issues and validates session tokens with a process-wide HMAC key.
pub struct TokenService {
    key: SecretSlice<u8>,
    ttl: Duration,
    ephemeral: bool,
    clock: SharedClock,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl", &self.ttl)
            .field("ephemeral", &self.ephemeral)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Service keyed with externally supplied secret material.
    ///
    /// # Errors
    ///
    /// Returns `WeakKey` when the secret is shorter than [`MIN_KEY_BYTES`].
    pub fn new(secret: &SecretString, clock: SharedClock) -> Result<Self, TokenError> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.len() < MIN_KEY_BYTES {
            return Err(TokenError::WeakKey);
        }
        Ok(Self {
            key: SecretSlice::from(bytes.to_vec()),
            ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECONDS),
            ephemeral: false,
            clock,
        })
    }

    /// Service keyed with 32 random bytes. Tokens do not survive a restart.
    #[must_use]
    pub fn ephemeral(clock: SharedClock) -> Self {
        let mut bytes = vec![0u8; MIN_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self {
            key: SecretSlice::from(bytes),
            ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECONDS),
            ephemeral: true,
            clock,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Token for `subject` with the default TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(&self, subject: &str, role: Role, campus: Campus) -> Result<String, TokenError> {
        self.issue_with_ttl(subject, role, campus, self.ttl)
    }

    /// Token expiring `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded or the expiry is not
    /// a representable date.
    pub fn issue_with_ttl(
        &self,
        subject: &str,
        role: Role,
        campus: Campus,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = self.clock.now();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or(TokenError::TtlOutOfRange)?;
        let claims = SessionClaims {
            sub: subject.to_string(),
            role,
            campus,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        let signing_input = format!(
            "{}.{}",
            b64e_json(&TokenHeader::hs256())?,
            b64e_json(&claims)?
        );
        let signature = self.mac(signing_input.as_bytes())?.finalize().into_bytes();
        Ok(format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature)
        ))
    }

    /// Verify signature and expiry and return the claims.
    ///
    /// # Errors
    ///
    /// Returns `Expired` once `exp` is not in the future; every other defect
    /// (format, encoding, algorithm, signature, claims) is reported as such.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        if parts.next().is_some() {
            return Err(TokenError::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        self.mac(format!("{header_b64}.{claims_b64}").as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: SessionClaims = b64d_json(claims_b64)?;
        if claims.sub.trim().is_empty() {
            return Err(TokenError::MissingSubject);
        }
        if claims.exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self, input: &[u8]) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret())
            .map_err(|_| TokenError::WeakKey)?;
        mac.update(input);
        Ok(mac)
    }
}
