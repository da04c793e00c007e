//! Object storage
//!
//! Components talk to object storage through [`ObjectStore`]; the S3 backend
//! is used in production and [`LocalStorage`] maps `bucket/key` onto a local
//! directory for tests and offline runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{config::Region, primitives::ByteStream, Client};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, instrument};

use crate::types::S3Location;

pub mod config;

pub use config::StorageConfig;

/// Result of writing an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub location: S3Location,
    pub checksum: String,
    pub size: u64,
}

/// Get/put access to objects addressed by [`S3Location`]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a whole object into memory
    async fn get(&self, location: &S3Location) -> Result<Vec<u8>>;

    /// Stream an object to a local file, returning the number of bytes written
    async fn download_to_file(&self, location: &S3Location, path: &Path) -> Result<u64>;

    /// Write an object from memory
    async fn put(
        &self,
        location: &S3Location,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<UploadResult>;

    /// Write an object from a local file
    async fn upload_file(
        &self,
        location: &S3Location,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<UploadResult>;

    /// Object size in bytes
    async fn size(&self, location: &S3Location) -> Result<u64>;
}

/// S3-backed object storage
#[derive(Clone)]
pub struct Storage {
    client: Client,
}

impl Storage {
    /// Build a client from configuration
    ///
    /// Static credentials are used when both keys are configured; otherwise the
    /// default AWS provider chain applies.
    pub async fn new(config: StorageConfig) -> Result<Self> {
        debug!(region = %config.region, endpoint = ?config.endpoint, "Initializing storage");

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "pointstore-storage",
            ));
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(region = %config.region, "Storage client initialized");

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for Storage {
    #[instrument(skip(self), fields(location = %location))]
    async fn get(&self, location: &S3Location) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", location))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!(bytes = data.len(), "Downloaded object");
        Ok(data)
    }

    #[instrument(skip(self), fields(location = %location))]
    async fn download_to_file(&self, location: &S3Location, path: &Path) -> Result<u64> {
        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", location))?;

        let mut body = response.body;
        let mut file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let mut written = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .context("Failed to read S3 response body")?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(bytes = written, path = %path.display(), "Downloaded object to file");
        Ok(written)
    }

    #[instrument(skip(self, data), fields(location = %location))]
    async fn put(
        &self,
        location: &S3Location,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<UploadResult> {
        let checksum = calculate_sha256(&data);
        let size = data.len() as u64;

        let mut request = self
            .client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(ByteStream::from(data));
        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to upload {}", location))?;

        info!(bytes = size, "Uploaded object");
        Ok(UploadResult {
            location: location.clone(),
            checksum,
            size,
        })
    }

    #[instrument(skip(self), fields(location = %location))]
    async fn upload_file(
        &self,
        location: &S3Location,
        path: &Path,
        content_type: Option<&str>,
    ) -> Result<UploadResult> {
        let (checksum, size) = sha256_file(path).await?;
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(body);
        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to upload {}", location))?;

        info!(bytes = size, "Uploaded file");
        Ok(UploadResult {
            location: location.clone(),
            checksum,
            size,
        })
    }

    #[instrument(skip(self), fields(location = %location))]
    async fn size(&self, location: &S3Location) -> Result<u64> {
        let response = self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .with_context(|| format!("Failed to get metadata for {}", location))?;

        Ok(response.content_length().unwrap_or(0).max(0) as u64)
    }
}

/// Object storage rooted at a local directory
///
/// `s3://bucket/a/b.csv` lives at `<root>/bucket/a/b.csv`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path backing a location
    pub fn path_for(&self, location: &S3Location) -> PathBuf {
        self.root.join(&location.bucket).join(&location.key)
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn get(&self, location: &S3Location) -> Result<Vec<u8>> {
        let path = self.path_for(location);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", location))
    }

    async fn download_to_file(&self, location: &S3Location, path: &Path) -> Result<u64> {
        tokio::fs::copy(self.path_for(location), path)
            .await
            .with_context(|| format!("Failed to copy {} to {}", location, path.display()))
    }

    async fn put(
        &self,
        location: &S3Location,
        data: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<UploadResult> {
        let path = self.path_for(location);
        Self::ensure_parent(&path).await?;

        let checksum = calculate_sha256(&data);
        let size = data.len() as u64;
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write {}", location))?;

        Ok(UploadResult {
            location: location.clone(),
            checksum,
            size,
        })
    }

    async fn upload_file(
        &self,
        location: &S3Location,
        path: &Path,
        _content_type: Option<&str>,
    ) -> Result<UploadResult> {
        let target = self.path_for(location);
        Self::ensure_parent(&target).await?;

        let (checksum, size) = sha256_file(path).await?;
        tokio::fs::copy(path, &target)
            .await
            .with_context(|| format!("Failed to write {}", location))?;

        Ok(UploadResult {
            location: location.clone(),
            checksum,
            size,
        })
    }

    async fn size(&self, location: &S3Location) -> Result<u64> {
        let metadata = tokio::fs::metadata(self.path_for(location))
            .await
            .with_context(|| format!("Failed to stat {}", location))?;
        Ok(metadata.len())
    }
}

fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

async fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }

    Ok((format!("{:x}", hasher.finalize()), size))
}
