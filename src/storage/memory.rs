//! In-memory object store for pipeline tests.

use crate::error::{VoicemailError, VoicemailResult};
use crate::storage::{ObjectStore, PutObjectRequest, StoredObject, TagSet};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), (StoredObject, TagSet)>>,
    pub puts: Mutex<Vec<PutObjectRequest>>,
    fail_writes: bool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, bucket: &str, key: &str, body: &[u8], tags: TagSet) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (
                StoredObject {
                    body: body.to_vec(),
                    content_type: None,
                },
                tags,
            ),
        );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(object, _)| object.clone())
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, request: PutObjectRequest) -> VoicemailResult<()> {
        self.puts.lock().unwrap().push(request.clone());
        if self.fail_writes {
            return Err(VoicemailError::storage(&request.bucket, &request.key, "access denied"));
        }
        let tags = TagSet::parse(&request.tagging);
        self.objects.lock().unwrap().insert(
            (request.bucket, request.key),
            (
                StoredObject {
                    body: request.body,
                    content_type: Some(request.content_type),
                },
                tags,
            ),
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> VoicemailResult<StoredObject> {
        self.object(bucket, key)
            .ok_or_else(|| VoicemailError::storage(bucket, key, "no such key"))
    }

    async fn get_object_tagging(&self, bucket: &str, key: &str) -> VoicemailResult<TagSet> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(_, tags)| tags.clone())
            .ok_or_else(|| VoicemailError::storage(bucket, key, "no such key"))
    }
}
