//! Filesystem-backed object store.
//!
//! Objects live at `<root>/<bucket>/<key>`; content type and tags are kept in a
//! JSON sidecar next to the object (`<object>.tags.json`).

use crate::error::{VoicemailError, VoicemailResult};
use crate::storage::{ObjectStore, PutObjectRequest, StoredObject, TagSet};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const SIDECAR_SUFFIX: &str = ".tags.json";

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMetadata {
    content_type: Option<String>,
    tags: TagSet,
}

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> VoicemailResult<PathBuf> {
        validate_segment(bucket, "bucket")?;
        if key.is_empty() || key.ends_with('/') || key.ends_with(SIDECAR_SUFFIX) {
            return Err(VoicemailError::InvalidKey(format!("unusable object key: {:?}", key)));
        }

        let relative = Path::new(key);
        let clean = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !clean || key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(VoicemailError::InvalidKey(format!(
                "object key escapes its bucket: {:?}",
                key
            )));
        }

        Ok(self.root.join(bucket).join(relative))
    }
}

fn validate_segment(value: &str, what: &str) -> VoicemailResult<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains('/') || value.contains('\\') {
        return Err(VoicemailError::InvalidKey(format!("invalid {}: {:?}", what, value)));
    }
    Ok(())
}

fn sidecar_path(object: &Path) -> PathBuf {
    let mut name = object.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(&self, request: PutObjectRequest) -> VoicemailResult<()> {
        let path = self.object_path(&request.bucket, &request.key)?;
        let storage_err =
            |e: std::io::Error| VoicemailError::storage(&request.bucket, &request.key, e.to_string());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
        }

        let metadata = ObjectMetadata {
            content_type: Some(request.content_type.clone()),
            tags: TagSet::parse(&request.tagging),
        };
        let sidecar = serde_json::to_vec_pretty(&metadata)?;

        tokio::fs::write(&path, &request.body).await.map_err(storage_err)?;
        tokio::fs::write(sidecar_path(&path), sidecar)
            .await
            .map_err(storage_err)?;

        debug!(
            bucket = %request.bucket,
            key = %request.key,
            bytes = request.body.len(),
            tags = metadata.tags.len(),
            "Object written"
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> VoicemailResult<StoredObject> {
        let path = self.object_path(bucket, key)?;
        let body = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => VoicemailError::storage(bucket, key, "no such key"),
            _ => VoicemailError::storage(bucket, key, e.to_string()),
        })?;

        let content_type = match tokio::fs::read(sidecar_path(&path)).await {
            Ok(raw) => serde_json::from_slice::<ObjectMetadata>(&raw)?.content_type,
            Err(_) => None,
        };

        Ok(StoredObject { body, content_type })
    }

    async fn get_object_tagging(&self, bucket: &str, key: &str) -> VoicemailResult<TagSet> {
        let path = self.object_path(bucket, key)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(VoicemailError::storage(bucket, key, "no such key"));
        }

        match tokio::fs::read(sidecar_path(&path)).await {
            Ok(raw) => Ok(serde_json::from_slice::<ObjectMetadata>(&raw)?.tags),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(TagSet::new()),
            Err(e) => Err(VoicemailError::storage(bucket, key, e.to_string())),
        }
    }
}
