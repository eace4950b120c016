//! Durable object stores.
//!
//! Every store implements create-only writes: putting a name that already
//! exists fails with [`StoreError::AlreadyExists`] instead of replacing the
//! object.

use std::future::Future;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use smol_str::SmolStr;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::StoreError;

/// Append-only object storage.
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` under `name`, failing if `name` already exists.
    fn put_new(
        &self,
        name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<S: ObjectStore> ObjectStore for std::sync::Arc<S> {
    fn put_new(
        &self,
        name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).put_new(name, bytes, content_type)
    }
}

/// Reject names that could escape a store root.
fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = |reason| StoreError::InvalidName {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    let path = Path::new(name);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err(invalid("name must be a relative path without `..`")),
        }
    }
    Ok(())
}

/// A stored object in a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: SmolStr,
}

/// In-process store, used for previews and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: DashMap<SmolStr, StoredObject>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<StoredObject> {
        self.objects.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStore for MemoryStore {
    async fn put_new(&self, name: &str, bytes: Bytes, content_type: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        match self.objects.entry(SmolStr::new(name)) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                name: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(StoredObject {
                    bytes,
                    content_type: SmolStr::new(content_type),
                });
                Ok(())
            }
        }
    }
}

/// Store rooted at a local directory. Names may contain `/` to namespace
/// objects into subdirectories.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ObjectStore for FsStore {
    async fn put_new(
        &self,
        name: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), StoreError> {
        validate_name(name)?;
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::unavailable_with(format!("cannot create {}", parent.display()), e)
            })?;
        }

        let file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists {
                    name: name.to_string(),
                });
            }
            Err(e) => {
                return Err(StoreError::unavailable_with(
                    format!("cannot create {}", path.display()),
                    e,
                ));
            }
        };

        fill_new_file(&path, file, &bytes).await?;

        tracing::debug!(path = %path.display(), len = bytes.len(), "stored object");
        Ok(())
    }
}

/// Write and flush a freshly created file. On failure the partial file is
/// removed so the name stays free.
async fn fill_new_file<W>(path: &Path, mut file: W, bytes: &[u8]) -> Result<(), StoreError>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(bytes).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    let Err(err) = written else {
        return Ok(());
    };
    drop(file);
    if let Err(cleanup) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), %cleanup, "partial object left behind");
    }
    Err(StoreError::unavailable_with(
        format!("write to {} failed", path.display()),
        err,
    ))
}

/// Store backed by a storage-bucket REST API
/// (`POST {endpoint}/object/{bucket}/{name}`), uploading with upsert disabled.
#[cfg(feature = "http-store")]
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    api_key: Option<String>,
}

#[cfg(feature = "http-store")]
impl HttpStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            api_key,
        }
    }

    pub fn object_url(&self, name: &str) -> String {
        format!("{}/object/{}/{}", self.endpoint, self.bucket, name)
    }
}

#[cfg(feature = "http-store")]
impl ObjectStore for HttpStore {
    async fn put_new(&self, name: &str, bytes: Bytes, content_type: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        let mut request = self
            .client
            .post(self.object_url(name))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CACHE_CONTROL, "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::unavailable_with("upload request failed", e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::CONFLICT || body.contains("Duplicate") {
            return Err(StoreError::AlreadyExists {
                name: name.to_string(),
            });
        }
        Err(StoreError::unavailable(format!(
            "storage responded {status}: {body}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_refuses_overwrite() {
        let store = MemoryStore::new();
        store
            .put_new("a.jpg", Bytes::from_static(b"one"), "image/jpeg")
            .await
            .unwrap();

        let err = store
            .put_new("a.jpg", Bytes::from_static(b"two"), "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(store.get("a.jpg").unwrap().bytes, Bytes::from_static(b"one"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_names_cannot_escape() {
        let store = MemoryStore::new();
        for name in ["", "../x.jpg", "/etc/passwd", "a/../../b"] {
            let err = store
                .put_new(name, Bytes::new(), "image/jpeg")
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidName { .. }), "{name}");
        }
    }

    #[tokio::test]
    async fn test_fs_store_writes_namespaced_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        store
            .put_new("desk/1-abc.jpg", Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();

        let written = std::fs::read(dir.path().join("desk/1-abc.jpg")).unwrap();
        assert_eq!(written, b"jpeg");
    }

    #[tokio::test]
    async fn test_fs_store_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store
            .put_new("x.jpg", Bytes::from_static(b"first"), "image/jpeg")
            .await
            .unwrap();

        let err = store
            .put_new("x.jpg", Bytes::from_static(b"second"), "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(std::fs::read(dir.path().join("x.jpg")).unwrap(), b"first");
    }

    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
            _: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::Error::other("no space left on device")))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.jpg");
        std::fs::write(&path, b"").unwrap();

        let err = fill_new_file(&path, FullDisk, b"jpeg").await.unwrap_err();

        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert!(!path.exists());
        let store = FsStore::new(dir.path());
        store
            .put_new("partial.jpg", Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();
    }

    #[cfg(feature = "http-store")]
    #[test]
    fn test_http_store_object_url() {
        let store = HttpStore::new("https://example.supabase.co/storage/v1/", "news-images", None);
        assert_eq!(
            store.object_url("2024/1-abc.jpg"),
            "https://example.supabase.co/storage/v1/object/news-images/2024/1-abc.jpg"
        );
    }
}
