//! Bearer tokens: plaintext layout and string framing.
//!
//! # Plaintext layout (25 bytes)
//!
//! ```text
//! principal_id (16, UUID bytes) || scopes (1) || expiry (8, i64 big-endian Unix seconds)
//! ```
//!
//! # String format
//!
//! ```text
//! <base64url-no-pad(wrapped_key)>.<base64url-no-pad(ciphertext)>
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::principal::PrincipalId;
use super::scope::ScopeSet;
use crate::crypto::Sealed;

const ENCODED_LEN: usize = 16 + 1 + 8;
const SEPARATOR: char = '.';

/// Token verification failures.
///
/// Expiry is reported separately so clients know to refresh rather than
/// re-authenticate; every other failure is the same opaque error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid access token")]
    Invalid,

    #[error("access token expired")]
    Expired,

    /// `now + ttl` is past the largest representable instant.
    #[error("token expiry out of range")]
    ExpiryOutOfRange,
}

/// A capability token: who, what they may do, and until when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub principal_id: PrincipalId,
    pub scopes: ScopeSet,
    /// Whole seconds; sub-second precision is dropped when minting.
    pub expiry: DateTime<Utc>,
}

impl AccessToken {
    /// Build a token expiring `ttl` after `now`, truncated to whole seconds.
    pub fn mint(
        principal_id: PrincipalId,
        scopes: ScopeSet,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<Self, TokenError> {
        let expiry = now
            .checked_add_signed(ttl)
            .ok_or(TokenError::ExpiryOutOfRange)?;
        let expiry = DateTime::from_timestamp(expiry.timestamp(), 0).unwrap_or(expiry);
        Ok(Self {
            principal_id,
            scopes,
            expiry,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENCODED_LEN);
        out.extend_from_slice(self.principal_id.as_bytes());
        out.push(self.scopes.bits());
        out.extend_from_slice(&self.expiry.timestamp().to_be_bytes());
        out
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, TokenError> {
        if bytes.len() != ENCODED_LEN {
            return Err(TokenError::Invalid);
        }
        let principal_id = PrincipalId::from_bytes(&bytes[..16]).map_err(|_| TokenError::Invalid)?;
        let scopes = ScopeSet::try_from(bytes[16]).map_err(|_| TokenError::Invalid)?;
        let mut secs = [0u8; 8];
        secs.copy_from_slice(&bytes[17..]);
        let expiry = DateTime::from_timestamp(i64::from_be_bytes(secs), 0).ok_or(TokenError::Invalid)?;
        Ok(Self {
            principal_id,
            scopes,
            expiry,
        })
    }
}

/// Render a sealed token as `wrappedKey.ciphertext`.
pub(crate) fn frame(sealed: &Sealed) -> String {
    format!(
        "{}{SEPARATOR}{}",
        URL_SAFE_NO_PAD.encode(&sealed.wrapped_key),
        URL_SAFE_NO_PAD.encode(&sealed.ciphertext),
    )
}

/// Split a token string into its sealed parts. Exactly two segments are accepted.
pub(crate) fn unframe(s: &str) -> Result<Sealed, TokenError> {
    let mut parts = s.split(SEPARATOR);
    let (Some(wrapped), Some(ciphertext), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TokenError::Invalid);
    };
    let wrapped_key = URL_SAFE_NO_PAD
        .decode(wrapped)
        .map_err(|_| TokenError::Invalid)?;
    let ciphertext = URL_SAFE_NO_PAD
        .decode(ciphertext)
        .map_err(|_| TokenError::Invalid)?;
    Ok(Sealed {
        wrapped_key,
        ciphertext,
    })
}
