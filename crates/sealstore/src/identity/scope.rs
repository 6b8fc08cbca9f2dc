//! Scope algebra: a closed set of capabilities packed into a bitmask.
//!
//! Bit positions are part of the token format and must never be reordered.

use serde::{Deserialize, Serialize};

/// A set of capabilities.
///
/// Sets combine with `|` (union) and are tested with [`ScopeSet::contains`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ScopeSet(u8);

/// Rejected scope value or name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("scope value {0} sets undefined capability bits")]
    OutOfRange(u64),

    #[error("unknown scope name: {0}")]
    UnknownName(String),
}

impl ScopeSet {
    pub const NONE: ScopeSet = ScopeSet(0);
    pub const READ: ScopeSet = ScopeSet(1 << 0);
    pub const CREATE: ScopeSet = ScopeSet(1 << 1);
    pub const UPDATE: ScopeSet = ScopeSet(1 << 2);
    pub const DELETE: ScopeSet = ScopeSet(1 << 3);
    pub const INDEX: ScopeSet = ScopeSet(1 << 4);
    pub const MANAGE_OBJECT_PERMISSIONS: ScopeSet = ScopeSet(1 << 5);
    pub const MANAGE_USERS: ScopeSet = ScopeSet(1 << 6);

    /// Number of defined capabilities.
    pub const CAPABILITIES: u32 = 7;

    /// Every defined capability.
    pub const ALL: ScopeSet = ScopeSet((1 << Self::CAPABILITIES) - 1);

    const NAMES: [(&'static str, ScopeSet); 7] = [
        ("read", Self::READ),
        ("create", Self::CREATE),
        ("update", Self::UPDATE),
        ("delete", Self::DELETE),
        ("index", Self::INDEX),
        ("manage_object_permissions", Self::MANAGE_OBJECT_PERMISSIONS),
        ("manage_users", Self::MANAGE_USERS),
    ];

    /// Validate a raw integer. Valid iff it is below `2^CAPABILITIES`.
    pub fn from_bits(bits: u64) -> Result<Self, ScopeError> {
        if bits >= 1 << Self::CAPABILITIES {
            return Err(ScopeError::OutOfRange(bits));
        }
        Ok(Self(bits as u8))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// `true` if every capability in `required` is present in `self`.
    pub fn contains(self, required: ScopeSet) -> bool {
        (self.0 & required.0) == required.0
    }

    /// Parse capability names such as `"read"` or `"manage_users"`.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ScopeError> {
        names.iter().try_fold(Self::NONE, |acc, name| {
            let name = name.as_ref();
            Self::NAMES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, scope)| acc | *scope)
                .ok_or_else(|| ScopeError::UnknownName(name.to_owned()))
        })
    }

    /// Capability names present in this set, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(_, scope)| self.contains(*scope))
            .map(|(n, _)| *n)
            .collect()
    }
}

impl std::ops::BitOr for ScopeSet {
    type Output = ScopeSet;

    fn bitor(self, rhs: ScopeSet) -> ScopeSet {
        ScopeSet(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ScopeSet {
    fn bitor_assign(&mut self, rhs: ScopeSet) {
        self.0 |= rhs.0;
    }
}

impl TryFrom<u8> for ScopeSet {
    type Error = ScopeError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::from_bits(u64::from(bits))
    }
}

impl From<ScopeSet> for u8 {
    fn from(scopes: ScopeSet) -> u8 {
        scopes.0
    }
}

impl std::fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_layout_is_stable() {
        assert_eq!(ScopeSet::READ.bits(), 0b000_0001);
        assert_eq!(ScopeSet::CREATE.bits(), 0b000_0010);
        assert_eq!(ScopeSet::UPDATE.bits(), 0b000_0100);
        assert_eq!(ScopeSet::DELETE.bits(), 0b000_1000);
        assert_eq!(ScopeSet::INDEX.bits(), 0b001_0000);
        assert_eq!(ScopeSet::MANAGE_OBJECT_PERMISSIONS.bits(), 0b010_0000);
        assert_eq!(ScopeSet::MANAGE_USERS.bits(), 0b100_0000);
        assert_eq!(ScopeSet::ALL.bits(), 0b111_1111);
    }

    #[test]
    fn validity_boundary() {
        assert!(ScopeSet::from_bits(127).is_ok());
        assert_eq!(ScopeSet::from_bits(128), Err(ScopeError::OutOfRange(128)));
        assert!(ScopeSet::try_from(255u8).is_err());
    }

    #[test]
    fn union_and_subset() {
        let have = ScopeSet::READ | ScopeSet::CREATE;
        assert!(have.contains(ScopeSet::READ));
        assert!(have.contains(ScopeSet::READ | ScopeSet::CREATE));
        assert!(!have.contains(ScopeSet::DELETE));
        assert!(have.contains(ScopeSet::NONE));
        assert!(!ScopeSet::NONE.contains(ScopeSet::READ));
    }

    #[test]
    fn names_round_trip() {
        let s = ScopeSet::from_names(&["read", "manage_users"]).unwrap();
        assert_eq!(s, ScopeSet::READ | ScopeSet::MANAGE_USERS);
        assert_eq!(s.names(), vec!["read", "manage_users"]);
        assert_eq!(s.to_string(), "read,manage_users");
    }

    #[test]
    fn unknown_name_rejected() {
        assert_eq!(
            ScopeSet::from_names(&["read", "admin"]),
            Err(ScopeError::UnknownName("admin".into()))
        );
    }

    #[test]
    fn serde_rejects_out_of_range() {
        assert_eq!(serde_json::to_string(&ScopeSet::ALL).unwrap(), "127");
        assert!(serde_json::from_str::<ScopeSet>("128").is_err());
    }
}
