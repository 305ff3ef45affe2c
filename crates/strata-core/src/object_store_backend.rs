//! [`StorageBackend`] over the `object_store` crate (S3, local filesystem, memory).
//!
//! Paths are `/`-separated keys, taken verbatim when they are valid
//! `object_store` paths so listed keys read back unchanged. Listing walks the
//! directory holding the last `/` of the prefix and filters by the full string
//! prefix, so `data_2021` matches `data_2021-01.gz` as it does in
//! [`MemoryBackend`](crate::storage::MemoryBackend).
//!
//! `WritePrecondition::DoesNotExist` maps to `PutMode::Create`. Stores that do
//! not implement conditional create fall back to head-then-put, which is not
//! atomic.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};

use crate::error::{Error, Result};
use crate::storage::{ObjectMeta, StorageBackend, WritePrecondition, WriteResult};

/// Storage backend wrapping any [`ObjectStore`] implementation.
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    label: String,
}

impl ObjectStoreBackend {
    /// Wraps an existing object store. `label` is used in log and error messages.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, label: impl Into<String>) -> Self {
        Self {
            store,
            label: label.into(),
        }
    }

    /// Creates an S3 backend for `bucket`.
    ///
    /// Credentials and endpoint settings are taken from the standard `AWS_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 client cannot be configured.
    pub fn s3(bucket: &str, region: Option<&str>) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        let store = builder.build().map_err(|e| {
            Error::storage_with_source(format!("failed to configure S3 bucket {bucket}"), e)
        })?;
        Ok(Self::new(Arc::new(store), format!("s3://{bucket}")))
    }

    /// Creates a backend rooted at a local directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or opened.
    pub fn local(root: impl AsRef<std::path::Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| {
            Error::storage_with_source(format!("failed to create {}", root.display()), e)
        })?;
        let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
            Error::storage_with_source(format!("failed to open {}", root.display()), e)
        })?;
        Ok(Self::new(
            Arc::new(store),
            format!("file://{}", root.display()),
        ))
    }

    /// Creates a process-local in-memory backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory://")
    }

    /// Returns the human-readable location of this store.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    fn map_err(&self, op: &str, path: &str, err: object_store::Error) -> Error {
        match err {
            object_store::Error::NotFound { .. } => {
                Error::NotFound(format!("object not found: {}/{path}", self.label))
            }
            other => Error::storage_with_source(
                format!("{op} failed for {}/{path}", self.label),
                other,
            ),
        }
    }

    async fn current_version(&self, path: &str) -> Result<String> {
        Ok(self
            .head(path)
            .await?
            .map(|meta| meta.version)
            .unwrap_or_default())
    }
}

/// Maps a key to an object store path without re-encoding already valid keys.
fn location(path: &str) -> Path {
    Path::parse(path).unwrap_or_else(|_| Path::from(path))
}

/// The directory a string prefix lives in, or `None` for the store root.
fn list_root(prefix: &str) -> Option<Path> {
    prefix
        .rfind('/')
        .map(|idx| prefix[..idx].trim_end_matches('/'))
        .filter(|dir| !dir.is_empty())
        .map(location)
}

fn convert_meta(meta: object_store::ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        path: meta.location.to_string(),
        size: u64::try_from(meta.size).unwrap_or(u64::MAX),
        version: meta.version.or(meta.e_tag).unwrap_or_default(),
        last_modified: Some(meta.last_modified),
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let location = location(path);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| self.map_err("get", path, e))?;
        result.bytes().await.map_err(|e| self.map_err("get", path, e))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let location = location(path);
        let opts = match precondition {
            WritePrecondition::DoesNotExist => PutOptions {
                mode: PutMode::Create,
                ..PutOptions::default()
            },
            WritePrecondition::None => PutOptions::default(),
        };

        match self
            .store
            .put_opts(&location, PutPayload::from(data.clone()), opts)
            .await
        {
            Ok(result) => Ok(WriteResult::Success {
                version: result.version.or(result.e_tag).unwrap_or_default(),
            }),
            Err(
                object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. },
            ) => Ok(WriteResult::PreconditionFailed {
                current_version: self.current_version(path).await?,
            }),
            Err(object_store::Error::NotImplemented) => {
                tracing::debug!(
                    store = %self.label,
                    path,
                    "conditional create unsupported; falling back to head-then-put"
                );
                if let Some(meta) = self.head(path).await? {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: meta.version,
                    });
                }
                self.put(path, data, WritePrecondition::None).await
            }
            Err(e) => Err(self.map_err("put", path, e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match self.store.delete(&location(path)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(self.map_err("delete", path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let dir = list_root(prefix);

        let metas: Vec<object_store::ObjectMeta> = self
            .store
            .list(dir.as_ref())
            .try_collect()
            .await
            .map_err(|e| self.map_err("list", prefix, e))?;

        Ok(metas
            .into_iter()
            .map(convert_meta)
            .filter(|meta| meta.path.starts_with(prefix))
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        match self.store.head(&location(path)).await {
            Ok(meta) => Ok(Some(convert_meta(meta))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(self.map_err("head", path, e)),
        }
    }
}
