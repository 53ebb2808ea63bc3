use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use crate::core::error::SourceError;
use crate::core::types::{ContainerId, MediaFile, MediaObject, ObjectId};
use crate::descriptor::MediaDescriptor;
use crate::stream::location::LocationHandle;

use super::memory::{derive_access_hash, derive_file_reference, kind_for_slot};
use super::{content_type_for_name, slot_for_mime, BoundedFetch, ObjectLookup};

// ---------------------------------------------------------------------------
// DirectorySource
// ---------------------------------------------------------------------------

/// Serves files from a local tree laid out as `<root>/<container_id>/<file>`.
///
/// Directories whose names are not integers are skipped. Inside a container,
/// regular files sorted by name become objects `1..=N`. The catalog is built
/// once at startup; file contents are read on every fetch.
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
    objects: HashMap<(ContainerId, ObjectId), MediaObject>,
    files: HashMap<i64, StoredFile>,
}

#[derive(Debug, Clone)]
struct StoredFile {
    path: PathBuf,
    access_hash: i64,
    file_reference: Bytes,
}

impl DirectorySource {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, SourceError> {
        let root = root.as_ref().to_path_buf();
        let mut objects = HashMap::new();
        let mut files = HashMap::new();
        let mut next_media_id: i64 = 1;

        for (container_id, dir) in container_dirs(&root).await? {
            for (index, path) in media_files(&dir).await?.into_iter().enumerate() {
                let object_id = ObjectId::new(index as i64 + 1);
                let metadata = tokio::fs::metadata(&path).await?;

                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string);
                let mime_type = file_name
                    .as_deref()
                    .and_then(content_type_for_name)
                    .map(str::to_string);
                let slot = slot_for_mime(mime_type.as_deref().unwrap_or_default());

                let media_id = next_media_id;
                next_media_id += 1;
                let descriptor = MediaDescriptor {
                    kind: kind_for_slot(slot),
                    media_id,
                    access_hash: derive_access_hash(media_id),
                    file_reference: derive_file_reference(media_id),
                    legacy: None,
                };

                debug!(
                    %container_id,
                    %object_id,
                    path = %path.display(),
                    size = metadata.len(),
                    "indexed media file"
                );

                objects.insert(
                    (container_id, object_id),
                    MediaObject::with_media(
                        slot,
                        MediaFile {
                            file_size: metadata.len(),
                            file_name,
                            mime_type,
                            file_ref: descriptor.encode(),
                        },
                    ),
                );
                files.insert(
                    media_id,
                    StoredFile {
                        path,
                        access_hash: descriptor.access_hash,
                        file_reference: descriptor.file_reference,
                    },
                );
            }
        }

        info!(
            root = %root.display(),
            objects = objects.len(),
            "directory source ready"
        );

        Ok(Self {
            root,
            objects,
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

async fn container_dirs(root: &Path) -> Result<Vec<(ContainerId, PathBuf)>, SourceError> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        match name.to_str().and_then(|n| n.parse::<ContainerId>().ok()) {
            Some(id) => dirs.push((id, entry.path())),
            None => warn!(path = %entry.path().display(), "skipping non-numeric container directory"),
        }
    }
    dirs.sort_by_key(|(id, _)| id.get());
    Ok(dirs)
}

async fn media_files(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

impl ObjectLookup for DirectorySource {
    async fn lookup_object(
        &self,
        container_id: ContainerId,
        object_id: ObjectId,
    ) -> Result<MediaObject, SourceError> {
        self.objects
            .get(&(container_id, object_id))
            .cloned()
            .ok_or(SourceError::ObjectNotFound {
                container_id,
                object_id,
            })
    }
}

impl BoundedFetch for DirectorySource {
    async fn fetch(
        &self,
        location: &LocationHandle,
        offset: u64,
        limit: u32,
    ) -> Result<Bytes, SourceError> {
        let LocationHandle::Document {
            media_id,
            access_hash,
            file_reference,
            ..
        } = location
        else {
            return Err(SourceError::LocationNotFound {
                location: location.to_string(),
            });
        };

        let stored = self
            .files
            .get(media_id)
            .ok_or_else(|| SourceError::LocationNotFound {
                location: location.to_string(),
            })?;
        if stored.access_hash != *access_hash || &stored.file_reference != file_reference {
            return Err(SourceError::AccessRejected {
                location: location.to_string(),
            });
        }

        let mut file = tokio::fs::File::open(&stored.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::with_capacity(limit as usize);
        file.take(u64::from(limit)).read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MediaSlot;

    async fn fixture() -> (tempfile::TempDir, DirectorySource) {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("-1001");
        std::fs::create_dir(&container).unwrap();
        std::fs::write(container.join("b_song.mp3"), vec![2u8; 50]).unwrap();
        std::fs::write(container.join("a_movie.mkv"), (0..200u8).collect::<Vec<u8>>()).unwrap();
        std::fs::create_dir(dir.path().join("not-a-chat")).unwrap();
        std::fs::write(dir.path().join("stray.txt"), b"x").unwrap();

        let source = DirectorySource::open(dir.path()).await.unwrap();
        (dir, source)
    }

    fn ids(object: i64) -> (ContainerId, ObjectId) {
        (ContainerId::new(-1001), ObjectId::new(object))
    }

    #[tokio::test]
    async fn test_files_become_numbered_objects() {
        let (_dir, source) = fixture().await;
        assert_eq!(source.object_count(), 2);

        let (c, o) = ids(1);
        let movie = source.lookup_object(c, o).await.unwrap();
        let (slot, file) = movie.primary_media().unwrap();
        assert_eq!(slot, MediaSlot::Video);
        assert_eq!(file.file_name.as_deref(), Some("a_movie.mkv"));
        assert_eq!(file.mime_type.as_deref(), Some("video/x-matroska"));
        assert_eq!(file.file_size, 200);

        let (c, o) = ids(2);
        let song = source.lookup_object(c, o).await.unwrap();
        assert_eq!(song.primary_media().unwrap().0, MediaSlot::Audio);
    }

    #[tokio::test]
    async fn test_unknown_object() {
        let (_dir, source) = fixture().await;
        let (c, o) = ids(3);
        assert!(matches!(
            source.lookup_object(c, o).await,
            Err(SourceError::ObjectNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_reads_bounded_window() {
        let (_dir, source) = fixture().await;
        let (c, o) = ids(1);
        let object = source.lookup_object(c, o).await.unwrap();
        let descriptor = MediaDescriptor::decode(&object.video.unwrap().file_ref).unwrap();
        let location = LocationHandle::resolve(&descriptor).unwrap();

        let chunk = source.fetch(&location, 10, 4).await.unwrap();
        assert_eq!(chunk.as_ref(), &[10, 11, 12, 13]);
        assert_eq!(source.fetch(&location, 190, 100).await.unwrap().len(), 10);
        assert!(source.fetch(&location, 200, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_rejects_forged_reference() {
        let (_dir, source) = fixture().await;
        let (c, o) = ids(1);
        let object = source.lookup_object(c, o).await.unwrap();
        let mut descriptor = MediaDescriptor::decode(&object.video.unwrap().file_ref).unwrap();
        descriptor.file_reference = Bytes::from_static(b"forged");
        let location = LocationHandle::resolve(&descriptor).unwrap();

        assert!(matches!(
            source.fetch(&location, 0, 4).await,
            Err(SourceError::AccessRejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectorySource::open(dir.path().join("absent")).await.unwrap_err();
        assert!(matches!(err, SourceError::Io(_)));
    }
}
