use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::{
    collections::HashSet,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{error::StorageError, models::RecipeImage};

// 1. AssetStore Contract
/// AssetStore
///
/// The abstract contract for the remote image store. Objects are addressed by the opaque
/// `public_id` returned from `upload`. The real S3 client and the in-memory mock both
/// implement it, so the recipe lifecycle never knows which one it is talking to.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Ensures the configured bucket exists. Only called for the local MinIO setup.
    async fn ensure_bucket_exists(&self);

    /// Uploads the file at `local_path` and returns its public identifier and URL.
    /// The local file is left untouched; removing it is the caller's job.
    async fn upload(&self, local_path: &Path) -> Result<RecipeImage, StorageError>;

    /// Deletes the object with the given public identifier.
    async fn delete(&self, public_id: &str) -> Result<(), StorageError>;
}

/// AssetState
///
/// The concrete type used to share the asset store across the application state.
pub type AssetState = Arc<dyn AssetStore>;

/// Key prefix for every recipe image.
const OBJECT_PREFIX: &str = "recipes";

/// file_extension
///
/// Lower-cased extension of `path`, restricted to ASCII alphanumerics. Falls back to
/// "bin" so a crafted file name can never inject path segments into the object key.
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

/// content_type_for
///
/// MIME type sent with the upload, derived from the file extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn object_key_for(path: &Path) -> String {
    format!("{}/{}.{}", OBJECT_PREFIX, Uuid::new_v4(), file_extension(path))
}

// 2. The Real Implementation (S3/MinIO/R2)
/// S3AssetStore
///
/// The concrete implementation using the AWS SDK for S3. Works against MinIO locally
/// and any S3-compatible provider in production.
///
/// `force_path_style(true)` is required for MinIO and Supabase compatibility.
#[derive(Clone)]
pub struct S3AssetStore {
    client: s3::Client,
    bucket_name: String,
    public_url: String,
}

impl S3AssetStore {
    /// new
    ///
    /// Constructs the S3 client using credentials and configuration from AppConfig.
    /// `public_url` is the base that image links are built from.
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        let client = s3::Client::from_conf(config);

        Self {
            client,
            bucket_name: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Public link for an object key (path-style: `<base>/<bucket>/<key>`).
    pub fn public_url_for(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket_name, key)
    }
}

#[async_trait]
impl AssetStore for S3AssetStore {
    /// ensure_bucket_exists
    ///
    /// Calls the S3 CreateBucket API. Failure (typically "already owned by you") is
    /// only logged.
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }

    async fn upload(&self, local_path: &Path) -> Result<RecipeImage, StorageError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::LocalFile {
                path: local_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let key = object_key_for(local_path);
        let content_type = content_type_for(&file_extension(local_path));

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        tracing::info!(public_id = %key, "image uploaded to asset store");

        Ok(RecipeImage {
            image_url: self.public_url_for(&key),
            public_id: key,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), StorageError> {
        if public_id.is_empty() {
            return Err(StorageError::Delete("empty public id".to_string()));
        }

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(public_id)
            .send()
            .await
            .map_err(|e| StorageError::Delete(e.to_string()))?;

        tracing::info!(public_id, "image deleted from asset store");
        Ok(())
    }
}

// 3. The Mock Implementation (For Tests)
/// MockAssetStore
///
/// In-memory stand-in for the asset store. Tracks which objects are "live" so tests
/// can assert that uploads and deletions happened, and can be told to fail either
/// operation. Clones share the same object set.
#[derive(Clone, Default)]
pub struct MockAssetStore {
    objects: Arc<Mutex<HashSet<String>>>,
    fail_uploads: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

impl MockAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose uploads always fail.
    pub fn new_failing() -> Self {
        let store = Self::default();
        store.set_fail_uploads(true);
        store
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn contains(&self, public_id: &str) -> bool {
        self.objects.lock().await.contains(public_id)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl AssetStore for MockAssetStore {
    async fn ensure_bucket_exists(&self) {}

    async fn upload(&self, local_path: &Path) -> Result<RecipeImage, StorageError> {
        if let Err(e) = tokio::fs::metadata(local_path).await {
            return Err(StorageError::LocalFile {
                path: local_path.display().to_string(),
                reason: e.to_string(),
            });
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Upload(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }

        let key = object_key_for(local_path);
        self.objects.lock().await.insert(key.clone());

        Ok(RecipeImage {
            image_url: format!("http://localhost:9000/mock-bucket/{key}"),
            public_id: key,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Delete(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        if self.objects.lock().await.remove(public_id) {
            Ok(())
        } else {
            Err(StorageError::Delete(format!("no object with id {public_id}")))
        }
    }
}
