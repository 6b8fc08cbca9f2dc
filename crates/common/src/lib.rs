//! Common types, protocol definitions, and errors shared across `sealstore` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
