//! Principal and object identifiers.
//!
//! Both are random UUIDs with the version-4 and RFC 4122 variant bits set.
//! Anything else is rejected before it can reach storage.

use serde::{Deserialize, Serialize};
use uuid::{Uuid, Variant, Version};

/// Reasons an identifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("identifier is not a valid UUID")]
    Malformed,

    #[error("identifier is not a version 4 UUID")]
    WrongVersion,
}

fn validate(uuid: Uuid) -> Result<Uuid, IdError> {
    if uuid.get_version() != Some(Version::Random) || uuid.get_variant() != Variant::RFC4122 {
        return Err(IdError::WrongVersion);
    }
    Ok(uuid)
}

macro_rules! v4_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "Uuid", into = "Uuid")]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse the textual form, enforcing version and variant bits.
            pub fn parse(s: &str) -> Result<Self, IdError> {
                let uuid = Uuid::parse_str(s).map_err(|_| IdError::Malformed)?;
                Ok(Self(validate(uuid)?))
            }

            /// Parse the 16-byte binary form, enforcing version and variant bits.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdError> {
                let uuid = Uuid::from_slice(bytes).map_err(|_| IdError::Malformed)?;
                Ok(Self(validate(uuid)?))
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl TryFrom<Uuid> for $name {
            type Error = IdError;

            fn try_from(uuid: Uuid) -> Result<Self, Self::Error> {
                Ok(Self(validate(uuid)?))
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

v4_id! {
    /// Identifies a user or a group. Users and groups share this space but
    /// live in separate tables.
    PrincipalId
}

v4_id! {
    /// Identifies a stored object and its access-control record.
    ObjectId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_validate() {
        let id = PrincipalId::new();
        assert_eq!(PrincipalId::parse(&id.to_string()).unwrap(), id);
        assert_eq!(PrincipalId::from_bytes(id.as_bytes()).unwrap(), id);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(PrincipalId::parse("not-a-uuid"), Err(IdError::Malformed));
        assert_eq!(ObjectId::from_bytes(&[0u8; 3]), Err(IdError::Malformed));
    }

    #[test]
    fn rejects_nil_and_time_based() {
        assert_eq!(
            PrincipalId::parse("00000000-0000-0000-0000-000000000000"),
            Err(IdError::WrongVersion)
        );
        // Version 1 (time-based) UUID.
        assert_eq!(
            ObjectId::parse("c232ab00-9414-11ec-b3c8-9f6bdeced846"),
            Err(IdError::WrongVersion)
        );
    }

    #[test]
    fn rejects_wrong_variant() {
        // Version nibble is 4 but the variant bits are Microsoft (110x).
        assert_eq!(
            PrincipalId::parse("6ba7b810-9dad-41d1-c0b4-00c04fd430c8"),
            Err(IdError::WrongVersion)
        );
    }

    #[test]
    fn serde_enforces_version() {
        let ok = serde_json::to_string(&PrincipalId::new()).unwrap();
        assert!(serde_json::from_str::<PrincipalId>(&ok).is_ok());
        let bad = "\"00000000-0000-0000-0000-000000000000\"";
        assert!(serde_json::from_str::<PrincipalId>(bad).is_err());
    }
}
