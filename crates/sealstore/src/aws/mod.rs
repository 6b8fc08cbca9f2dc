//! AWS SDK client initialisation for KMS and Secrets Manager.
//!
//! Used only at startup, to fetch and decrypt the root key bundle.

pub mod clients;

pub use clients::AwsClients;
