//! S3 (and S3-compatible) uploads.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use tracing::debug;

use super::Uploader;
use crate::config::S3Target;
use crate::{Error, Result};

const CREDENTIALS_PROVIDER: &str = "recorder-config";

/// Uploads with the AWS SDK.
///
/// Static credentials from the target win; otherwise the SDK's default
/// provider chain (environment, profile, instance metadata) is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Uploader;

impl S3Uploader {
    pub fn new() -> Self {
        Self
    }

    async fn client(&self, target: &S3Target) -> aws_sdk_s3::Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &target.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(creds) = &target.credentials {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key.clone(),
                creds.secret.clone(),
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &target.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        aws_sdk_s3::Client::from_conf(builder.build())
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    async fn upload(&self, local: &Path, target: &S3Target) -> Result<String> {
        let body = ByteStream::from_path(local)
            .await
            .map_err(|e| Error::upload(format!("cannot read {}: {e}", local.display())))?;

        let client = self.client(target).await;
        debug!(bucket = %target.bucket, key = %target.key, "put_object");
        client
            .put_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::upload(DisplayErrorContext(&e).to_string()))?;

        Ok(format!("s3://{}/{}", target.bucket, target.key))
    }
}
