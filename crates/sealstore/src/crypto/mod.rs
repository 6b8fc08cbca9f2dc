//! Envelope encryption primitives.
//!
//! This module is intentionally free of storage and HTTP dependencies.
//!
//! # Layers
//!
//! - [`cipher`]: AES-256-GCM-SIV sealing (`nonce || ciphertext || tag`) and
//!   deterministic key wrapping.
//! - [`keys`]: zero-on-drop key buffers, encryption domains, root key bundles.
//! - [`envelope`]: one [`EnvelopeCryptor`] per domain; fresh data key per
//!   envelope, wrapped under the domain's root key.

pub mod cipher;
pub mod envelope;
pub mod keys;

pub use cipher::CryptoError;
pub use envelope::{Cryptors, EnvelopeCryptor, Sealed};
pub use keys::{DataKey, RootKeys};
