//! Identity & Token Service: principals, scopes, users, groups and bearer tokens.
//!
//! # Security invariants
//!
//! - Passwords are only ever stored as PBKDF2-HMAC-SHA256 hashes inside an
//!   encrypted user record; hash comparison is constant-time.
//! - Token verification never touches storage.
//! - Passwords, hashes and token strings must not appear in any log field.

pub mod principal;
pub mod scope;
pub mod service;
pub mod token;

pub use principal::{ObjectId, PrincipalId};
pub use scope::{ScopeError, ScopeSet};
pub use service::{IdentityError, IdentityService};
pub use token::{AccessToken, TokenError};
