//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from relo-core.
//! Folder keys (ending in `/`) are expanded client-side: the prefix is
//! listed and every key under it is copied or deleted individually. Each
//! SDK request, a single listing page included, runs under its own
//! deadline, so a large folder is never bounded as a whole.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, MetadataDirective, ObjectIdentifier};
use aws_smithy_types::retry::RetryConfig;
use aws_smithy_types::timeout::TimeoutConfig;

use relo_core::{Alias, Container, Error, Metadata, ObjectRef, ObjectStore, Result};

/// Upper bound of keys accepted by one DeleteObjects request
const DELETE_BATCH: usize = 1000;

/// Deadline of one request unless the caller sets another
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// S3 client wrapper bound to one alias
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    alias: Alias,
    request_timeout: Duration,
}

impl S3Client {
    /// Create a new S3 client from an alias configuration
    pub async fn new(alias: Alias) -> Result<Self> {
        let credentials = aws_credential_types::Credentials::new(
            alias.access_key.clone(),
            alias.secret_key.clone(),
            None, // session token
            None, // expiry
            "relo-static-credentials",
        );

        let retry_config = RetryConfig::standard().with_max_attempts(alias.tuning.max_attempts());
        let timeout_config = TimeoutConfig::builder()
            .connect_timeout(alias.tuning.connect_timeout())
            .build();

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(alias.region.clone()))
            .endpoint_url(&alias.endpoint)
            .retry_config(retry_config)
            .timeout_config(timeout_config)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(alias.path_style())
            .build();

        tracing::debug!(alias = %alias.name, endpoint = %alias.endpoint, "s3 client ready");

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            alias,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Bound every request, retries included, by `limit`
    pub fn with_request_timeout(mut self, limit: Duration) -> Self {
        self.request_timeout = limit;
        self
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    fn ensure_alias(&self, container: &Container) -> Result<()> {
        if container.alias != self.alias.name {
            return Err(Error::UnsupportedFeature(format!(
                "client for '{}' cannot reach container '{container}'",
                self.alias.name
            )));
        }
        Ok(())
    }

    /// Await one SDK request under the per-request deadline
    async fn send<T, E>(
        &self,
        target: &str,
        request: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T>
    where
        E: std::error::Error,
    {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(classify(&DisplayErrorContext(&e).to_string(), target)),
            Err(_) => Err(Error::Timeout(self.request_timeout)),
        }
    }

    async fn copy_one(
        &self,
        src: &Container,
        src_key: &str,
        dst: &Container,
        dst_key: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        let mut request = self
            .inner
            .copy_object()
            .copy_source(format!("{}/{}", src.bucket, encode_key(src_key)))
            .bucket(&dst.bucket)
            .key(dst_key);
        if !metadata.is_empty() {
            let replaced: HashMap<String, String> = metadata.clone().into_iter().collect();
            request = request
                .metadata_directive(MetadataDirective::Replace)
                .set_metadata(Some(replaced));
        }
        self.send(&format!("{src}/{src_key}"), request.send()).await?;
        Ok(())
    }

    async fn delete_many(&self, container: &Container, keys: &[String]) -> Result<()> {
        for chunk in keys.chunks(DELETE_BATCH) {
            let objects = chunk
                .iter()
                .map(|k| ObjectIdentifier::builder().key(k).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::General(e.to_string()))?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| Error::General(e.to_string()))?;

            let request = self
                .inner
                .delete_objects()
                .bucket(&container.bucket)
                .delete(delete)
                .send();
            let response = self.send(&container.to_string(), request).await?;

            if let Some(first) = response.errors().first() {
                let failed: Vec<&str> = response.errors().iter().filter_map(|e| e.key()).collect();
                tracing::warn!(container = %container, failed = ?failed, "batch delete left keys behind");
                let code = first.code().unwrap_or_default();
                let message = format!(
                    "{} of {} keys not deleted: {}",
                    failed.len(),
                    chunk.len(),
                    first.message().unwrap_or(code)
                );
                return Err(classify(&format!("{code} {message}"), &message));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_objects(&self, container: &Container, prefix: &str) -> Result<Vec<ObjectRef>> {
        self.ensure_alias(container)?;

        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = self.inner.list_objects_v2().bucket(&container.bucket);
            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = self.send(&container.to_string(), request.send()).await?;

            for object in response.contents() {
                let key = object.key().unwrap_or_default();
                let size = u64::try_from(object.size().unwrap_or(0)).unwrap_or(0);
                let mut obj = ObjectRef::from_key(key, size);
                if let Some(modified) = object.last_modified() {
                    obj.last_modified = jiff::Timestamp::from_second(modified.secs()).ok();
                }
                objects.push(obj);
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        tracing::debug!(container = %container, prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }

    async fn copy_object(
        &self,
        src: &Container,
        src_key: &str,
        dst: &Container,
        dst_key: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        self.ensure_alias(src)?;
        self.ensure_alias(dst)?;

        if !src_key.ends_with('/') {
            return self.copy_one(src, src_key, dst, dst_key, metadata).await;
        }

        let sources = self.list_objects(src, src_key).await?;
        if sources.is_empty() {
            return Err(Error::NotFound(format!("{src}/{src_key}")));
        }
        for object in &sources {
            let suffix = &object.key[src_key.len()..];
            self.copy_one(src, &object.key, dst, &format!("{dst_key}{suffix}"), metadata)
                .await?;
        }
        Ok(())
    }

    async fn get_object(&self, container: &Container, key: &str) -> Result<Vec<u8>> {
        self.ensure_alias(container)?;
        let target = format!("{container}/{key}");

        let request = self
            .inner
            .get_object()
            .bucket(&container.bucket)
            .key(key)
            .send();
        let response = self.send(&target, request).await?;
        let body = tokio::time::timeout(self.request_timeout, response.body.collect())
            .await
            .map_err(|_| Error::Timeout(self.request_timeout))?
            .map_err(|e| Error::Network(format!("reading {target}: {e}")))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn head_metadata(&self, container: &Container, key: &str) -> Result<Metadata> {
        self.ensure_alias(container)?;

        let request = self
            .inner
            .head_object()
            .bucket(&container.bucket)
            .key(key)
            .send();
        let response = self.send(&format!("{container}/{key}"), request).await?;
        Ok(response
            .metadata()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn delete_object(&self, container: &Container, key: &str) -> Result<()> {
        self.ensure_alias(container)?;

        if key.ends_with('/') {
            let keys: Vec<String> = self
                .list_objects(container, key)
                .await?
                .into_iter()
                .map(|o| o.key)
                .collect();
            return self.delete_many(container, &keys).await;
        }

        let request = self
            .inner
            .delete_object()
            .bucket(&container.bucket)
            .key(key)
            .send();
        self.send(&format!("{container}/{key}"), request).await?;
        Ok(())
    }

    async fn put_object(
        &self,
        container: &Container,
        key: &str,
        data: Vec<u8>,
    ) -> Result<ObjectRef> {
        self.ensure_alias(container)?;

        let size = data.len() as u64;
        let request = self
            .inner
            .put_object()
            .bucket(&container.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send();
        self.send(&format!("{container}/{key}"), request).await?;

        let mut obj = ObjectRef::file(key, size);
        obj.last_modified = Some(jiff::Timestamp::now());
        Ok(obj)
    }
}

/// Map an SDK error message to the core error taxonomy
fn classify(message: &str, target: &str) -> Error {
    if message.contains("NoSuchKey") || message.contains("NoSuchBucket") || message.contains("NotFound") {
        Error::NotFound(target.to_string())
    } else if message.contains("AccessDenied")
        || message.contains("InvalidAccessKeyId")
        || message.contains("SignatureDoesNotMatch")
    {
        Error::Auth(message.to_string())
    } else {
        Error::Network(message.to_string())
    }
}

/// Percent-encode a key for the `x-amz-copy-source` header, keeping `/`
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}
