//! AWS SDK client bundle.

use aws_config::BehaviorVersion;

/// KMS and Secrets Manager clients sharing one [`aws_config::SdkConfig`], so
/// that credentials are resolved once and reused.
#[derive(Clone, Debug)]
pub struct AwsClients {
    /// Decrypts the root key bundle.
    pub kms: aws_sdk_kms::Client,
    /// Holds the encrypted root key bundle.
    pub secretsmanager: aws_sdk_secretsmanager::Client,
}

impl AwsClients {
    /// Initialise both clients from the standard credential and region chain.
    ///
    /// `endpoint_url` overrides the service endpoint for both clients, for
    /// local stacks or egress proxies.
    pub async fn init(endpoint_url: Option<&str>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let mut kms = aws_sdk_kms::config::Builder::from(&config);
        let mut secretsmanager = aws_sdk_secretsmanager::config::Builder::from(&config);
        if let Some(url) = endpoint_url {
            kms = kms.endpoint_url(url);
            secretsmanager = secretsmanager.endpoint_url(url);
        }

        Self {
            kms: aws_sdk_kms::Client::from_conf(kms.build()),
            secretsmanager: aws_sdk_secretsmanager::Client::from_conf(secretsmanager.build()),
        }
    }
}
