use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::core::error::{DescriptorError, SourceError};
use crate::core::types::{ContainerId, MediaFile, MediaObject, MediaSlot, ObjectId};
use crate::descriptor::{MediaDescriptor, MediaKind};
use crate::stream::location::LocationHandle;

use super::{BoundedFetch, ObjectLookup};

// ---------------------------------------------------------------------------
// InMemoryRemote
// ---------------------------------------------------------------------------

/// In-process stand-in for the remote object store.
///
/// Holds messages and file contents behind `RwLock`s and enforces the same
/// credential checks a real store does: a fetch must present the access hash
/// (or legacy secret) and file reference the file was published with.
pub struct InMemoryRemote {
    objects: Arc<RwLock<HashMap<(ContainerId, ObjectId), MediaObject>>>,
    blobs: Arc<RwLock<HashMap<BlobKey, StoredBlob>>>,
    next_media_id: AtomicI64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BlobKey {
    Document(i64),
    Legacy(i64, i32),
}

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    credential: i64,
    file_reference: Bytes,
}

fn blob_key(location: &LocationHandle) -> (BlobKey, i64) {
    match location {
        LocationHandle::Document {
            media_id,
            access_hash,
            ..
        } => (BlobKey::Document(*media_id), *access_hash),
        LocationHandle::Legacy {
            volume_id,
            local_id,
            secret,
            ..
        } => (BlobKey::Legacy(*volume_id, *local_id), *secret),
    }
}

/// Deterministic per-file access hash.
pub(crate) fn derive_access_hash(media_id: i64) -> i64 {
    media_id.wrapping_mul(0x5DEE_CE66_D).rotate_left(17) ^ 0x2545_F491
}

pub(crate) fn derive_file_reference(media_id: i64) -> Bytes {
    let mut reference = vec![0x01];
    reference.extend_from_slice(&media_id.to_le_bytes());
    Bytes::from(reference)
}

pub(crate) fn kind_for_slot(slot: MediaSlot) -> MediaKind {
    match slot {
        MediaSlot::Video => MediaKind::Video,
        MediaSlot::Document => MediaKind::Document,
        MediaSlot::Audio => MediaKind::Audio,
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            blobs: Arc::new(RwLock::new(HashMap::new())),
            next_media_id: AtomicI64::new(1),
        }
    }

    /// Publish `data` as the `slot` media of a new message and return the
    /// descriptor it can be fetched with.
    pub async fn insert_media(
        &self,
        container_id: ContainerId,
        object_id: ObjectId,
        slot: MediaSlot,
        data: impl Into<Bytes>,
        file_name: Option<&str>,
        mime_type: Option<&str>,
    ) -> MediaDescriptor {
        let data = data.into();
        let media_id = self.next_media_id.fetch_add(1, Ordering::Relaxed);
        let descriptor = MediaDescriptor {
            kind: kind_for_slot(slot),
            media_id,
            access_hash: derive_access_hash(media_id),
            file_reference: derive_file_reference(media_id),
            legacy: None,
        };

        let file = MediaFile {
            file_size: data.len() as u64,
            file_name: file_name.map(str::to_string),
            mime_type: mime_type.map(str::to_string),
            file_ref: descriptor.encode(),
        };
        self.insert_object(container_id, object_id, MediaObject::with_media(slot, file))
            .await;

        self.blobs.write().await.insert(
            BlobKey::Document(media_id),
            StoredBlob {
                data,
                credential: descriptor.access_hash,
                file_reference: descriptor.file_reference.clone(),
            },
        );
        descriptor
    }

    /// Store a message as-is. The media it points at may or may not exist.
    pub async fn insert_object(
        &self,
        container_id: ContainerId,
        object_id: ObjectId,
        object: MediaObject,
    ) {
        self.objects
            .write()
            .await
            .insert((container_id, object_id), object);
    }

    /// Store file contents reachable through `descriptor`.
    pub async fn insert_blob(
        &self,
        descriptor: &MediaDescriptor,
        data: impl Into<Bytes>,
    ) -> Result<(), DescriptorError> {
        let location = LocationHandle::resolve(descriptor)?;
        let (key, credential) = blob_key(&location);
        self.blobs.write().await.insert(
            key,
            StoredBlob {
                data: data.into(),
                credential,
                file_reference: location.file_reference().clone(),
            },
        );
        Ok(())
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectLookup for InMemoryRemote {
    async fn lookup_object(
        &self,
        container_id: ContainerId,
        object_id: ObjectId,
    ) -> Result<MediaObject, SourceError> {
        self.objects
            .read()
            .await
            .get(&(container_id, object_id))
            .cloned()
            .ok_or(SourceError::ObjectNotFound {
                container_id,
                object_id,
            })
    }
}

impl BoundedFetch for InMemoryRemote {
    async fn fetch(
        &self,
        location: &LocationHandle,
        offset: u64,
        limit: u32,
    ) -> Result<Bytes, SourceError> {
        let (key, credential) = blob_key(location);
        let blobs = self.blobs.read().await;
        let blob = blobs.get(&key).ok_or_else(|| SourceError::LocationNotFound {
            location: location.to_string(),
        })?;

        if blob.credential != credential || &blob.file_reference != location.file_reference() {
            return Err(SourceError::AccessRejected {
                location: location.to_string(),
            });
        }

        let len = blob.data.len() as u64;
        if offset >= len {
            return Ok(Bytes::new());
        }
        let end = (offset + u64::from(limit)).min(len);
        Ok(blob.data.slice(offset as usize..end as usize))
    }
}
