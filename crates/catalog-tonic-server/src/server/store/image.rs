use bytes::Bytes;
use catalog_tonic_core::{Error, Result};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use uuid::Uuid;

/// Metadata recorded for every completed upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    pub laptop_id: String,
    pub image_type: String,
    pub path: PathBuf,
}

/// Storage for uploaded laptop images.
#[tonic::async_trait]
pub trait ImageStore: Send + Sync {
    /// Persists `data` and records its metadata, returning the new image id.
    ///
    /// The laptop id is not checked here; callers validate it first.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if `image_type` is not a plain file
    ///   extension such as `.png`.
    /// - [`Error::Persist`] if the blob could not be written.
    async fn save(&self, laptop_id: &str, image_type: &str, data: Bytes) -> Result<String>;

    /// Returns the metadata of a stored image.
    fn find(&self, id: &str) -> Option<ImageRecord>;
}

/// Writes each image to `<folder>/<id><image_type>` and keeps the metadata
/// in memory.
///
/// Blob writes happen outside the metadata lock. Ids are fresh UUIDs, so two
/// uploads never target the same file.
#[derive(Debug)]
pub struct DiskImageStore {
    folder: PathBuf,
    images: RwLock<HashMap<String, ImageRecord>>,
}

impl DiskImageStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            images: RwLock::new(HashMap::new()),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn len(&self) -> usize {
        self.images.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accepts `.` followed by 1-10 ASCII alphanumerics.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] for anything else.
pub fn validate_image_type(image_type: &str) -> Result<()> {
    let valid = image_type.strip_prefix('.').is_some_and(|ext| {
        (1..=10).contains(&ext.len()) && ext.bytes().all(|b| b.is_ascii_alphanumeric())
    });
    if valid {
        Ok(())
    } else {
        Err(Error::invalid(format!("unsupported image type {image_type:?}")))
    }
}

#[tonic::async_trait]
impl ImageStore for DiskImageStore {
    async fn save(&self, laptop_id: &str, image_type: &str, data: Bytes) -> Result<String> {
        validate_image_type(image_type)?;

        let id = Uuid::new_v4().to_string();
        let path = self.folder.join(format!("{id}{image_type}"));

        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| Error::Persist {
                context: format!("cannot write image file {}: {e}", path.display()),
            })?;

        let info = ImageRecord {
            id: id.clone(),
            laptop_id: laptop_id.to_string(),
            image_type: image_type.to_string(),
            path,
        };
        self.images.write().insert(id.clone(), info);

        Ok(id)
    }

    fn find(&self, id: &str) -> Option<ImageRecord> {
        self.images.read().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_writes_blob_and_records_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(dir.path());

        let id = store
            .save("laptop-1", ".png", Bytes::from_static(b"\x89PNG data"))
            .await
            .unwrap();

        let info = store.find(&id).unwrap();
        assert_eq!(info.laptop_id, "laptop-1");
        assert_eq!(info.image_type, ".png");
        assert_eq!(info.path, dir.path().join(format!("{id}.png")));
        assert_eq!(std::fs::read(&info.path).unwrap(), b"\x89PNG data");
    }

    #[tokio::test]
    async fn concurrent_saves_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(DiskImageStore::new(dir.path()));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .save("laptop", ".jpg", Bytes::from(vec![i as u8; 64]))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap());
        }
        assert_eq!(ids.len(), 16);
        assert_eq!(store.len(), 16);
    }

    #[tokio::test]
    async fn rejects_path_like_image_types() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(dir.path());

        for bad in ["png", "./../x", ".p/g", "", ".averyverylongext"] {
            let err = store.save("l", bad, Bytes::new()).await.unwrap_err();
            assert!(matches!(err, Error::InvalidRequest { .. }), "{bad}");
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn write_failure_is_a_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskImageStore::new(dir.path().join("missing"));

        let err = store.save("l", ".png", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, Error::Persist { .. }));
        assert!(store.is_empty());
    }
}
