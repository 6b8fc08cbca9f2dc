//! Root key provisioning at startup.
//!
//! The five domain root keys come from exactly one source:
//!
//! 1. **Secrets Manager + KMS**: the secret holds a KMS ciphertext whose
//!    plaintext is the 160-byte bundle `token || user || group || access || payload`.
//! 2. **Inline**: five base64 environment variables, one per domain.
//!
//! # Security invariants
//!
//! - Root key material is never written to disk, logged, or included in traces.
//! - Intermediate plaintext buffers are zeroed once the keys are built.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::info;

use crate::aws::AwsClients;
use crate::config::{Config, RootKeySource, SecretString};
use crate::crypto::RootKeys;

/// Load the root keys from the source configured in `cfg`.
///
/// # Errors
///
/// Returns an error if the source cannot be read, or if the key material is
/// malformed, of the wrong length, or reused across domains.
pub async fn load(cfg: &Config) -> Result<RootKeys> {
    match cfg.root_key_source()? {
        RootKeySource::SecretsManager {
            secret_arn,
            kms_key_id,
        } => {
            let aws = AwsClients::init(cfg.aws_endpoint_url.as_deref()).await;
            fetch_bundle(&aws, secret_arn, kms_key_id).await
        }
        RootKeySource::Inline(keys) => {
            let keys = decode_inline(keys)?;
            info!("root keys loaded from environment");
            Ok(keys)
        }
    }
}

/// Fetch the encrypted bundle from Secrets Manager and decrypt it via KMS.
async fn fetch_bundle(aws: &AwsClients, secret_arn: &str, kms_key_id: &str) -> Result<RootKeys> {
    let secret = aws
        .secretsmanager
        .get_secret_value()
        .secret_id(secret_arn)
        .send()
        .await
        .context("failed to fetch root key bundle from Secrets Manager")?;

    let ciphertext = secret
        .secret_binary()
        .context("root key secret must be stored as binary in Secrets Manager")?
        .as_ref()
        .to_vec();

    let decrypted = aws
        .kms
        .decrypt()
        .key_id(kms_key_id)
        .ciphertext_blob(aws_sdk_kms::primitives::Blob::new(ciphertext))
        .send()
        .await
        .context("failed to decrypt root key bundle via KMS")?;

    let plaintext = decrypted
        .plaintext()
        .context("KMS decrypt response contained no plaintext")?;

    let mut bundle = plaintext.as_ref().to_vec();
    let keys = RootKeys::from_bundle(&bundle).context("invalid root key bundle");
    bundle.fill(0);

    info!("root keys fetched and decrypted via KMS");
    keys
}

fn decode_inline(encoded: [&SecretString; 5]) -> Result<RootKeys> {
    const NAMES: [&str; 5] = [
        "TOKEN_ROOT_KEY",
        "USER_ROOT_KEY",
        "GROUP_ROOT_KEY",
        "ACCESS_ROOT_KEY",
        "PAYLOAD_ROOT_KEY",
    ];

    let mut raw = Vec::with_capacity(encoded.len());
    for (value, name) in encoded.iter().zip(NAMES) {
        let bytes = STANDARD
            .decode(value.expose().trim())
            .with_context(|| format!("{name} is not valid base64"))?;
        raw.push(bytes);
    }

    let keys = RootKeys::from_parts(&raw[0], &raw[1], &raw[2], &raw[3], &raw[4])
        .context("invalid inline root keys");
    raw.iter_mut().for_each(|k| k.fill(0));
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn encoded(byte: u8) -> SecretString {
        STANDARD.encode([byte; 32]).as_str().into()
    }

    #[test]
    fn decodes_five_distinct_keys() {
        let keys = [encoded(1), encoded(2), encoded(3), encoded(4), encoded(5)];
        let refs = [&keys[0], &keys[1], &keys[2], &keys[3], &keys[4]];
        let root = decode_inline(refs).unwrap();
        assert_eq!(root.token.as_bytes(), &[1u8; 32]);
        assert_eq!(root.payload.as_bytes(), &[5u8; 32]);
    }

    #[test]
    fn rejects_reused_key() {
        let keys = [encoded(1), encoded(2), encoded(1), encoded(4), encoded(5)];
        let refs = [&keys[0], &keys[1], &keys[2], &keys[3], &keys[4]];
        assert!(decode_inline(refs).is_err());
    }

    #[test]
    fn rejects_bad_base64_and_short_keys() {
        let bad: SecretString = "not base64!".into();
        let short: SecretString = STANDARD.encode([9u8; 16]).as_str().into();
        let ok = [encoded(1), encoded(2), encoded(3), encoded(4)];
        assert!(decode_inline([&bad, &ok[0], &ok[1], &ok[2], &ok[3]]).is_err());
        assert!(decode_inline([&short, &ok[0], &ok[1], &ok[2], &ok[3]]).is_err());
    }

    #[tokio::test]
    async fn load_rejects_short_inline_keys() {
        // The test configuration carries one-byte placeholder keys.
        assert!(load(&test_config()).await.is_err());
    }

    #[tokio::test]
    async fn load_accepts_valid_inline_keys() {
        let mut cfg = test_config();
        cfg.token_root_key = Some(encoded(1));
        cfg.user_root_key = Some(encoded(2));
        cfg.group_root_key = Some(encoded(3));
        cfg.access_root_key = Some(encoded(4));
        cfg.payload_root_key = Some(encoded(5));
        assert!(load(&cfg).await.is_ok());
    }
}
