pub mod directory;
pub mod memory;
pub mod retry;

use bytes::Bytes;

use crate::core::error::SourceError;
use crate::core::types::{ContainerId, MediaObject, MediaSlot, ObjectId};
use crate::stream::location::LocationHandle;

// ---------------------------------------------------------------------------
// Remote store collaborators
// ---------------------------------------------------------------------------

/// Resolves a `(container, object)` pair to the message carrying the media.
pub trait ObjectLookup: Send + Sync {
    fn lookup_object(
        &self,
        container_id: ContainerId,
        object_id: ObjectId,
    ) -> impl std::future::Future<Output = Result<MediaObject, SourceError>> + Send;
}

/// The bounded read primitive: up to `limit` bytes starting at `offset`.
///
/// Implementations may return fewer bytes than asked for, and return an empty
/// buffer once `offset` is at or past the end of the object.
pub trait BoundedFetch: Send + Sync {
    fn fetch(
        &self,
        location: &LocationHandle,
        offset: u64,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Bytes, SourceError>> + Send;
}

/// Everything the HTTP layer needs from the remote store.
pub trait RemoteClient: ObjectLookup + BoundedFetch + 'static {}

impl<T> RemoteClient for T where T: ObjectLookup + BoundedFetch + 'static {}

// ---------------------------------------------------------------------------
// Content type helpers
// ---------------------------------------------------------------------------

/// Determine content type from file extension.
pub fn content_type_for_name(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "ts" => "video/mp2t",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "txt" => "text/plain",
        _ => return None,
    };
    Some(mime)
}

/// File extension used when a file name has to be generated.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "video/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-msvideo" => "avi",
        "video/mp2t" => "ts",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "audio/ogg" => "ogg",
        "audio/opus" => "opus",
        "audio/flac" => "flac",
        "audio/wav" => "wav",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "text/plain" => "txt",
        _ => "bin",
    }
}

/// Which message slot a file of this MIME type is published under.
pub fn slot_for_mime(mime: &str) -> MediaSlot {
    if mime.starts_with("video/") {
        MediaSlot::Video
    } else if mime.starts_with("audio/") {
        MediaSlot::Audio
    } else {
        MediaSlot::Document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for_name() {
        assert_eq!(content_type_for_name("movie.MKV"), Some("video/x-matroska"));
        assert_eq!(content_type_for_name("song.mp3"), Some("audio/mpeg"));
        assert_eq!(content_type_for_name("archive.tar.zip"), Some("application/zip"));
        assert_eq!(content_type_for_name("README"), None);
        assert_eq!(content_type_for_name("blob.xyz"), None);
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("video/mp4"), "mp4");
        assert_eq!(extension_for_mime("application/x-unknown"), "bin");
    }

    #[test]
    fn test_slot_for_mime() {
        assert_eq!(slot_for_mime("video/webm"), MediaSlot::Video);
        assert_eq!(slot_for_mime("audio/flac"), MediaSlot::Audio);
        assert_eq!(slot_for_mime("application/pdf"), MediaSlot::Document);
    }
}
