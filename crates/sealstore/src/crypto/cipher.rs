//! AES-256-GCM-SIV sealing and deterministic key wrapping.
//!
//! **Sealing** uses a fresh random 96-bit nonce per call and prepends it to
//! the output, so one data key can safely seal many payloads.
//!
//! **Key wrapping** is deterministic: the data key is sealed under the root
//! key with a fixed all-zero nonce. AES-GCM-SIV derives its synthetic IV from
//! the plaintext, so this is a deterministic authenticated encryption of a
//! uniformly random 32-byte key. Never use the fixed nonce for anything but
//! fresh random key material.

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256GcmSiv, Nonce,
};
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the AES-GCM-SIV authentication tag.
pub const TAG_LEN: usize = 16;

/// Byte length of a wrapped data key.
pub const WRAPPED_KEY_LEN: usize = KEY_LEN + TAG_LEN;

const WRAP_NONCE: [u8; NONCE_LEN] = [0u8; NONCE_LEN];

/// Errors produced by the cipher layer.
///
/// Every decryption-side failure collapses into [`CryptoError::InvalidCiphertext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key material supplied at construction is not [`KEY_LEN`] bytes.
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// AES-GCM-SIV encryption failed.
    #[error("aead operation failed")]
    AeadFailure,

    /// Authentication, unwrapping or framing of a ciphertext failed.
    #[error("invalid ciphertext")]
    InvalidCiphertext,
}

/// Seal `plaintext` under `key`, binding `aad` into the tag.
///
/// Output layout: `nonce || ciphertext || tag`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
pub fn seal(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = build_cipher(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadFailure)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a value produced by [`seal`].
///
/// # Errors
///
/// Returns [`CryptoError::InvalidCiphertext`] on any failure.
pub fn open(key: &[u8], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::InvalidCiphertext);
    }
    let cipher = build_cipher(key).map_err(|_| CryptoError::InvalidCiphertext)?;
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::InvalidCiphertext)
}

/// Deterministically wrap `key` under `kek`. `label` is bound as associated data.
pub fn wrap_key(kek: &[u8], key: &[u8], label: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength);
    }
    let cipher = build_cipher(kek)?;
    cipher
        .encrypt(
            Nonce::from_slice(&WRAP_NONCE),
            Payload {
                msg: key,
                aad: label,
            },
        )
        .map_err(|_| CryptoError::AeadFailure)
}

/// Inverse of [`wrap_key`]. Rejects anything that does not unwrap to [`KEY_LEN`] bytes.
pub fn unwrap_key(kek: &[u8], wrapped: &[u8], label: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if wrapped.len() != WRAPPED_KEY_LEN {
        return Err(CryptoError::InvalidCiphertext);
    }
    let cipher = build_cipher(kek).map_err(|_| CryptoError::InvalidCiphertext)?;
    let key = cipher
        .decrypt(
            Nonce::from_slice(&WRAP_NONCE),
            Payload {
                msg: wrapped,
                aad: label,
            },
        )
        .map_err(|_| CryptoError::InvalidCiphertext)?;
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidCiphertext);
    }
    Ok(key)
}

/// Fill a fixed-size buffer from the OS CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

fn build_cipher(key: &[u8]) -> Result<Aes256GcmSiv, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength);
    }
    Aes256GcmSiv::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)
}
