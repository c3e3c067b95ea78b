use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use super::aws_sigv4::{host_header, uri_encode_path, AwsCredentials, Signer, SigningRequest};
use crate::models::{MediaType, RawImage};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("object is empty: {0}")]
    EmptyObject(String),

    #[error("storage location not configured ({0})")]
    MissingConfiguration(String),
}

/// Read-only access to uploaded brew photos
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Resolve `key` to fully materialized, non-empty image bytes.
    async fn fetch(&self, key: &str) -> Result<RawImage, StorageError>;
}

/// Build a `RawImage` for `key`, refusing empty payloads.
pub fn materialize(key: &str, bytes: Vec<u8>) -> Result<RawImage, StorageError> {
    if bytes.is_empty() {
        return Err(StorageError::EmptyObject(key.to_string()));
    }
    Ok(RawImage::new(bytes, MediaType::from_key(key)))
}

/// S3 (or S3-compatible) object store, signed with SigV4
pub struct S3ImageStore {
    bucket: Option<String>,
    region: String,
    endpoint: Option<String>,
    credentials: AwsCredentials,
    client: reqwest::Client,
}

impl S3ImageStore {
    pub fn new(
        bucket: Option<String>,
        region: String,
        endpoint: Option<String>,
        credentials: AwsCredentials,
    ) -> Self {
        Self {
            bucket,
            region,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            credentials,
            client: reqwest::Client::new(),
        }
    }

    /// Encoded request path and full URL for `key`
    fn object_url(&self, bucket: &str, key: &str) -> (String, String) {
        let key = key.trim_start_matches('/');
        match &self.endpoint {
            // Path-style for custom endpoints (MinIO, localstack, ...)
            Some(endpoint) => {
                let path = uri_encode_path(&format!("/{}/{}", bucket, key));
                let url = format!("{}{}", endpoint, path);
                (path, url)
            }
            None => {
                let path = uri_encode_path(&format!("/{}", key));
                let url = format!("https://{}.s3.{}.amazonaws.com{}", bucket, self.region, path);
                (path, url)
            }
        }
    }
}

#[async_trait]
impl ImageFetcher for S3ImageStore {
    async fn fetch(&self, key: &str) -> Result<RawImage, StorageError> {
        let bucket = self
            .bucket
            .as_deref()
            .ok_or_else(|| StorageError::MissingConfiguration("BUCKET_NAME".to_string()))?;

        let (path, url) = self.object_url(bucket, key);
        let parsed = reqwest::Url::parse(&url)
            .map_err(|e| StorageError::Unavailable(format!("invalid object url {}: {}", url, e)))?;
        let host = host_header(&parsed);

        let signed = Signer::new(&self.credentials, &self.region, "s3").sign(
            &SigningRequest {
                method: "GET",
                host: &host,
                canonical_uri: &path,
                canonical_query: "",
                headers: &[],
                payload: b"",
            },
            chrono::Utc::now(),
        );

        log::debug!("🪣 Fetching s3://{}/{}", bucket, key);

        let mut request = self.client.get(parsed);
        for (name, value) in signed {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            log::warn!("⚠️ Photo not found in storage: {}", key);
            return Err(StorageError::ObjectNotFound(key.to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::error!("❌ S3 error ({}) for {}: {}", status, key, error_text);
            return Err(StorageError::Unavailable(format!("S3 returned {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Unavailable(format!("reading object body: {}", e)))?;

        log::debug!("📊 Fetched {} bytes for {}", bytes.len(), key);
        materialize(key, bytes.to_vec())
    }
}

/// Photos stored under a local directory, keyed by relative path
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Only plain relative paths naming something below `root` are accepted.
    fn resolve(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let is_plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        let names_entry = relative.components().any(|c| matches!(c, Component::Normal(_)));
        if !is_plain || !names_entry {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl ImageFetcher for LocalImageStore {
    async fn fetch(&self, key: &str) -> Result<RawImage, StorageError> {
        let path = self
            .resolve(key)
            .ok_or_else(|| StorageError::ObjectNotFound(key.to_string()))?;

        log::debug!("📁 Reading photo from {}", path.display());

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("⚠️ Photo not found: {}", path.display());
                return Err(StorageError::ObjectNotFound(key.to_string()));
            }
            Err(e) => {
                log::error!("❌ Failed to read {}: {}", path.display(), e);
                return Err(StorageError::Unavailable(e.to_string()));
            }
        };

        materialize(key, bytes)
    }
}
