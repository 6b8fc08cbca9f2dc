//! Key material: zero-on-drop key buffers, encryption domains, and the
//! per-domain root key bundle.

use super::cipher::{random_bytes, CryptoError, KEY_LEN};

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// When this type is dropped, the memory is overwritten with zeroes to
/// minimise the window during which plaintext key material lives in RAM.
#[derive(Clone)]
pub struct SecretKey(Box<[u8; KEY_LEN]>);

/// A per-object or per-record data encryption key.
pub type DataKey = SecretKey;

impl SecretKey {
    /// Copy `bytes` into a new key buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the slice has the wrong length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength);
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Generate a fresh random key from the OS CSPRNG.
    pub fn generate() -> Self {
        Self(Box::new(random_bytes::<KEY_LEN>()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("SecretKey([REDACTED])")
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl Eq for SecretKey {}

/// Class of data protected by one root key.
///
/// Each domain has an independent root key, so a leaked key for one class
/// exposes nothing about another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Token,
    User,
    Group,
    Access,
    Payload,
}

impl Domain {
    /// All domains, in root-key bundle order.
    pub const ALL: [Domain; 5] = [
        Domain::Token,
        Domain::User,
        Domain::Group,
        Domain::Access,
        Domain::Payload,
    ];

    /// Stable label bound into every key wrap performed in this domain.
    pub fn label(self) -> &'static str {
        match self {
            Domain::Token => "token",
            Domain::User => "user",
            Domain::Group => "group",
            Domain::Access => "access",
            Domain::Payload => "payload",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One root key per [`Domain`].
#[derive(Debug, Clone)]
pub struct RootKeys {
    pub token: SecretKey,
    pub user: SecretKey,
    pub group: SecretKey,
    pub access: SecretKey,
    pub payload: SecretKey,
}

/// Errors assembling a [`RootKeys`] bundle.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RootKeyError {
    #[error("root key bundle must be {expected} bytes, got {actual}")]
    BundleLength { expected: usize, actual: usize },

    #[error("root key for the {0} domain has invalid length")]
    KeyLength(Domain),

    #[error("root keys for the {0} and {1} domains are identical")]
    Duplicate(Domain, Domain),
}

impl RootKeys {
    /// Byte length of a concatenated bundle.
    pub const BUNDLE_LEN: usize = KEY_LEN * Domain::ALL.len();

    /// Build a bundle from per-domain key bytes, rejecting reused keys.
    pub fn from_parts(
        token: &[u8],
        user: &[u8],
        group: &[u8],
        access: &[u8],
        payload: &[u8],
    ) -> Result<Self, RootKeyError> {
        let parts = [token, user, group, access, payload];
        for (i, a) in parts.iter().enumerate() {
            if a.len() != KEY_LEN {
                return Err(RootKeyError::KeyLength(Domain::ALL[i]));
            }
            for (j, b) in parts.iter().enumerate().skip(i + 1) {
                if a == b {
                    return Err(RootKeyError::Duplicate(Domain::ALL[i], Domain::ALL[j]));
                }
            }
        }
        let key = |i: usize| {
            SecretKey::from_slice(parts[i]).map_err(|_| RootKeyError::KeyLength(Domain::ALL[i]))
        };
        Ok(Self {
            token: key(0)?,
            user: key(1)?,
            group: key(2)?,
            access: key(3)?,
            payload: key(4)?,
        })
    }

    /// Split a concatenated bundle laid out in [`Domain::ALL`] order.
    pub fn from_bundle(bundle: &[u8]) -> Result<Self, RootKeyError> {
        if bundle.len() != Self::BUNDLE_LEN {
            return Err(RootKeyError::BundleLength {
                expected: Self::BUNDLE_LEN,
                actual: bundle.len(),
            });
        }
        let chunk = |i: usize| &bundle[i * KEY_LEN..(i + 1) * KEY_LEN];
        Self::from_parts(chunk(0), chunk(1), chunk(2), chunk(3), chunk(4))
    }

    /// Independent random keys for every domain.
    #[cfg(test)]
    pub fn generate() -> Self {
        Self {
            token: SecretKey::generate(),
            user: SecretKey::generate(),
            group: SecretKey::generate(),
            access: SecretKey::generate(),
            payload: SecretKey::generate(),
        }
    }
}
