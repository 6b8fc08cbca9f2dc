//! Configuration loading and validation for the sealstore service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any variable is missing or invalid.

use std::fmt;

use anyhow::{Context, Result};
use serde::Deserialize;

/// A string that must never appear in logs or `Debug` output.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the HTTP(S) server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// PEM certificate chain. TLS is enabled when this and `tls_key_path` are set.
    pub tls_cert_path: Option<String>,

    /// PEM private key matching `tls_cert_path`.
    pub tls_key_path: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP/gRPC collector endpoint. Span export is disabled when unset.
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Lifetime of issued bearer tokens, in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Create an administrator holding every scope at startup.
    #[serde(default = "default_bootstrap_admin")]
    pub bootstrap_admin: bool,

    /// Secrets Manager ARN of the KMS-encrypted root key bundle.
    pub root_key_secret_arn: Option<String>,

    /// KMS key ID used to decrypt the root key bundle.
    pub kms_key_id: Option<String>,

    /// Endpoint override for the AWS clients (local stacks, proxies).
    pub aws_endpoint_url: Option<String>,

    pub token_root_key: Option<SecretString>,
    pub user_root_key: Option<SecretString>,
    pub group_root_key: Option<SecretString>,
    pub access_root_key: Option<SecretString>,
    pub payload_root_key: Option<SecretString>,
}

/// Where the five domain root keys come from.
#[derive(Debug, Clone, Copy)]
pub enum RootKeySource<'a> {
    /// A 160-byte bundle in Secrets Manager, encrypted under a KMS key.
    SecretsManager {
        secret_arn: &'a str,
        kms_key_id: &'a str,
    },
    /// Base64 keys supplied directly, in domain order.
    Inline([&'a SecretString; 5]),
}

fn default_listen_port() -> u16 {
    8443
}
fn default_log_level() -> String {
    "info".into()
}

/// Upper bound on `TOKEN_TTL_SECS`: one year.
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

fn default_token_ttl() -> u64 {
    3600
}
fn default_bootstrap_admin() -> bool {
    true
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or the combination
    /// of variables is invalid.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Certificate and key paths, if TLS is enabled.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }

    /// Token lifetime, never longer than [`MAX_TOKEN_TTL_SECS`].
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_ttl_secs.min(MAX_TOKEN_TTL_SECS) as i64)
    }

    /// Resolve the single configured root key source.
    ///
    /// # Errors
    ///
    /// Returns an error if no source, both sources, or only part of a
    /// source is configured.
    pub fn root_key_source(&self) -> Result<RootKeySource<'_>> {
        let inline = [
            &self.token_root_key,
            &self.user_root_key,
            &self.group_root_key,
            &self.access_root_key,
            &self.payload_root_key,
        ];
        let inline_set = inline.iter().filter(|k| k.is_some()).count();

        match (&self.root_key_secret_arn, &self.kms_key_id) {
            (Some(arn), Some(kms)) => {
                if inline_set > 0 {
                    anyhow::bail!(
                        "ROOT_KEY_SECRET_ARN and inline *_ROOT_KEY variables are mutually exclusive"
                    );
                }
                ensure_non_empty(arn, "ROOT_KEY_SECRET_ARN")?;
                ensure_non_empty(kms, "KMS_KEY_ID")?;
                Ok(RootKeySource::SecretsManager {
                    secret_arn: arn,
                    kms_key_id: kms,
                })
            }
            (Some(_), None) => anyhow::bail!("KMS_KEY_ID is required with ROOT_KEY_SECRET_ARN"),
            (None, Some(_)) => anyhow::bail!("ROOT_KEY_SECRET_ARN is required with KMS_KEY_ID"),
            (None, None) => match inline {
                [Some(t), Some(u), Some(g), Some(a), Some(p)] => {
                    Ok(RootKeySource::Inline([t, u, g, a, p]))
                }
                _ if inline_set == 0 => anyhow::bail!(
                    "no root keys configured: set ROOT_KEY_SECRET_ARN and KMS_KEY_ID, \
                     or all five *_ROOT_KEY variables"
                ),
                _ => anyhow::bail!(
                    "TOKEN_, USER_, GROUP_, ACCESS_ and PAYLOAD_ROOT_KEY must all be set together"
                ),
            },
        }
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            anyhow::bail!("TLS_CERT_PATH and TLS_KEY_PATH must be set together");
        }
        if let Some((cert, key)) = self.tls_paths() {
            ensure_non_empty(cert, "TLS_CERT_PATH")?;
            ensure_non_empty(key, "TLS_KEY_PATH")?;
        }
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        if self.token_ttl_secs == 0 || self.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            anyhow::bail!(
                "TOKEN_TTL_SECS must be between 1 and {MAX_TOKEN_TTL_SECS} seconds"
            );
        }
        self.root_key_source()?;
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        listen_port: default_listen_port(),
        tls_cert_path: None,
        tls_key_path: None,
        log_level: default_log_level(),
        otel_exporter_otlp_endpoint: None,
        token_ttl_secs: default_token_ttl(),
        bootstrap_admin: default_bootstrap_admin(),
        root_key_secret_arn: None,
        kms_key_id: None,
        aws_endpoint_url: None,
        token_root_key: Some("dA==".into()),
        user_root_key: Some("dQ==".into()),
        group_root_key: Some("Zw==".into()),
        access_root_key: Some("YQ==".into()),
        payload_root_key: Some("cA==".into()),
    }
}
