//! [`IdentityService`]: users, groups, password login and bearer tokens.

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::Hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use super::principal::{IdError, PrincipalId};
use super::scope::ScopeSet;
use super::token::{self, AccessToken, TokenError};
use crate::crypto::cipher::random_bytes;
use crate::crypto::{CryptoError, Cryptors, EnvelopeCryptor};
use crate::storage::{StorageError, Transaction};

/// PBKDF2 iteration count for password hashes.
pub const PBKDF2_ROUNDS: u32 = 10_000;

const HASH_LEN: usize = 32;
const SALT_LEN: usize = 32;
const PASSWORD_BYTES: usize = 32;

/// Errors produced by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Password mismatch. Deliberately carries no detail.
    #[error("authentication failed")]
    Unauthenticated,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("record encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for IdentityError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => IdentityError::NotFound("record"),
            other => IdentityError::Storage(other),
        }
    }
}

/// Map a storage NotFound onto the entity kind that was being addressed.
fn missing(what: &'static str) -> impl Fn(StorageError) -> IdentityError {
    move |err| match err {
        StorageError::NotFound => IdentityError::NotFound(what),
        other => IdentityError::Storage(other),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserData {
    user_id: PrincipalId,
    password_hash: Vec<u8>,
    salt: Vec<u8>,
    groups: BTreeSet<PrincipalId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GroupData {
    group_id: PrincipalId,
    scopes: ScopeSet,
}

/// Account lifecycle, password authentication and stateless token issuance.
///
/// Tokens are never looked up in storage: membership changes and user
/// removal take effect for a principal only once its outstanding tokens
/// expire, at most `token_ttl` later.
#[derive(Debug, Clone)]
pub struct IdentityService {
    users: Arc<EnvelopeCryptor>,
    groups: Arc<EnvelopeCryptor>,
    tokens: Arc<EnvelopeCryptor>,
    token_ttl: chrono::Duration,
}

impl IdentityService {
    pub fn new(cryptors: &Cryptors, token_ttl: chrono::Duration) -> Self {
        Self {
            users: Arc::clone(&cryptors.user),
            groups: Arc::clone(&cryptors.group),
            tokens: Arc::clone(&cryptors.token),
            token_ttl,
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        self.token_ttl
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Create a user with a generated password and no group memberships.
    ///
    /// Callers normally follow up with a default group; see
    /// [`IdentityService::create_user_with_default_group`].
    pub fn new_user<T: Transaction>(
        &self,
        tx: &mut T,
    ) -> Result<(PrincipalId, String), IdentityError> {
        let user_id = PrincipalId::new();
        let password = URL_SAFE_NO_PAD.encode(random_bytes::<PASSWORD_BYTES>());
        let salt = random_bytes::<SALT_LEN>().to_vec();
        let password_hash = hash_password(&password, &salt)?;

        let data = UserData {
            user_id,
            password_hash,
            salt,
            groups: BTreeSet::new(),
        };
        self.put_user(tx, &data, true)?;
        info!(user_id = %user_id, "user created");
        Ok((user_id, password))
    }

    /// Create a user plus its default group (same identifier) with `scopes`.
    pub fn create_user_with_default_group<T: Transaction>(
        &self,
        tx: &mut T,
        scopes: ScopeSet,
    ) -> Result<(PrincipalId, String), IdentityError> {
        let (user_id, password) = self.new_user(tx)?;
        self.new_group_with_id(tx, user_id, scopes)?;
        self.add_user_to_group(tx, user_id, user_id)?;
        Ok((user_id, password))
    }

    /// Verify a password and mint a token carrying the union of the user's group scopes.
    pub fn login_user<T: Transaction>(
        &self,
        tx: &mut T,
        user_id: PrincipalId,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, IdentityError> {
        let user = self.get_user(tx, user_id)?;
        let supplied = hash_password(password, &user.salt)?;
        if !bool::from(supplied.ct_eq(&user.password_hash)) {
            debug!(user_id = %user_id, "login rejected");
            return Err(IdentityError::Unauthenticated);
        }

        let scopes = self.resolve_scopes(tx, &user.groups)?;
        Ok(AccessToken::mint(user_id, scopes, now, self.token_ttl)?)
    }

    /// Soft-delete a user. Removing an unknown or already-removed user is NotFound.
    pub fn remove_user<T: Transaction>(
        &self,
        tx: &mut T,
        user_id: PrincipalId,
    ) -> Result<(), IdentityError> {
        tx.remove_user(user_id).map_err(missing("user"))?;
        info!(user_id = %user_id, "user removed");
        Ok(())
    }

    pub fn user_groups<T: Transaction>(
        &self,
        tx: &mut T,
        user_id: PrincipalId,
    ) -> Result<BTreeSet<PrincipalId>, IdentityError> {
        Ok(self.get_user(tx, user_id)?.groups)
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub fn new_group<T: Transaction>(
        &self,
        tx: &mut T,
        scopes: ScopeSet,
    ) -> Result<PrincipalId, IdentityError> {
        let group_id = PrincipalId::new();
        self.new_group_with_id(tx, group_id, scopes)?;
        Ok(group_id)
    }

    pub fn new_group_with_id<T: Transaction>(
        &self,
        tx: &mut T,
        group_id: PrincipalId,
        scopes: ScopeSet,
    ) -> Result<(), IdentityError> {
        let data = GroupData { group_id, scopes };
        let plaintext = serde_json::to_vec(&data).map_err(|e| IdentityError::Encoding(e.to_string()))?;
        let sealed = self.groups.encrypt(&plaintext, group_id.as_bytes())?;
        tx.insert_group(group_id, sealed)?;
        info!(group_id = %group_id, scopes = %scopes, "group created");
        Ok(())
    }

    /// Add `group_id` to the user's memberships. Adding an existing membership is a no-op.
    pub fn add_user_to_group<T: Transaction>(
        &self,
        tx: &mut T,
        user_id: PrincipalId,
        group_id: PrincipalId,
    ) -> Result<(), IdentityError> {
        if !tx.group_exists(group_id)? {
            return Err(IdentityError::NotFound("group"));
        }
        let mut user = self.get_user(tx, user_id)?;
        if user.groups.insert(group_id) {
            self.put_user(tx, &user, false)?;
        }
        Ok(())
    }

    /// Remove `group_id` from the user's memberships. Removing an absent membership is a no-op.
    pub fn remove_user_from_group<T: Transaction>(
        &self,
        tx: &mut T,
        user_id: PrincipalId,
        group_id: PrincipalId,
    ) -> Result<(), IdentityError> {
        let mut user = self.get_user(tx, user_id)?;
        if user.groups.remove(&group_id) {
            self.put_user(tx, &user, false)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tokens
    // -----------------------------------------------------------------------

    /// Encrypt a token under the token domain and frame it as `wrappedKey.ciphertext`.
    pub fn serialize_access_token(&self, token: &AccessToken) -> Result<String, IdentityError> {
        let sealed = self.tokens.encrypt(&token.encode(), &[])?;
        Ok(token::frame(&sealed))
    }

    /// Verify and decode a token string. No storage access.
    ///
    /// # Errors
    ///
    /// [`TokenError::Expired`] once `now` is past the token's expiry;
    /// [`TokenError::Invalid`] for every format or authentication failure.
    pub fn parse_access_token(
        &self,
        s: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, IdentityError> {
        let sealed = token::unframe(s)?;
        let plaintext = self
            .tokens
            .decrypt(&sealed, &[])
            .map_err(|_| TokenError::Invalid)?;
        let token = AccessToken::decode(&plaintext)?;
        if token.is_expired(now) {
            return Err(TokenError::Expired.into());
        }
        Ok(token)
    }

    // -----------------------------------------------------------------------
    // Record helpers
    // -----------------------------------------------------------------------

    fn get_user<T: Transaction>(
        &self,
        tx: &mut T,
        user_id: PrincipalId,
    ) -> Result<UserData, IdentityError> {
        let sealed = tx.get_user_data(user_id).map_err(missing("user"))?;
        let plaintext = self.users.decrypt(&sealed, user_id.as_bytes())?;
        let user: UserData = serde_json::from_slice(&plaintext)
            .map_err(|e| IdentityError::Encoding(e.to_string()))?;
        if user.user_id != user_id {
            return Err(CryptoError::InvalidCiphertext.into());
        }
        Ok(user)
    }

    fn put_user<T: Transaction>(
        &self,
        tx: &mut T,
        user: &UserData,
        insert: bool,
    ) -> Result<(), IdentityError> {
        let plaintext =
            serde_json::to_vec(user).map_err(|e| IdentityError::Encoding(e.to_string()))?;
        let sealed = self.users.encrypt(&plaintext, user.user_id.as_bytes())?;
        if insert {
            tx.insert_user(user.user_id, sealed)?;
        } else {
            tx.update_user(user.user_id, sealed).map_err(missing("user"))?;
        }
        Ok(())
    }

    fn resolve_scopes<T: Transaction>(
        &self,
        tx: &mut T,
        groups: &BTreeSet<PrincipalId>,
    ) -> Result<ScopeSet, IdentityError> {
        let ids: Vec<PrincipalId> = groups.iter().copied().collect();
        let mut scopes = ScopeSet::NONE;
        for (group_id, sealed) in tx.get_group_data_batch(&ids)? {
            let plaintext = self.groups.decrypt(&sealed, group_id.as_bytes())?;
            let group: GroupData = serde_json::from_slice(&plaintext)
                .map_err(|e| IdentityError::Encoding(e.to_string()))?;
            if group.group_id != group_id {
                return Err(CryptoError::InvalidCiphertext.into());
            }
            scopes |= group.scopes;
        }
        Ok(scopes)
    }
}

fn hash_password(password: &str, salt: &[u8]) -> Result<Vec<u8>, IdentityError> {
    let mut out = vec![0u8; HASH_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut out)
        .map_err(|_| CryptoError::InvalidKeyLength)?;
    Ok(out)
}
