use std::fmt;

use bytes::Bytes;

use crate::core::error::DescriptorError;
use crate::core::redact::{describe_reference, Redacted};
use crate::descriptor::MediaDescriptor;

/// Addressing fields the bounded fetch primitive needs for one object.
#[derive(Clone, PartialEq, Eq)]
pub enum LocationHandle {
    /// Video, document and audio objects.
    Document {
        media_id: i64,
        access_hash: i64,
        file_reference: Bytes,
        /// Always empty: the original file, never a thumbnail.
        thumb_size: String,
    },
    /// Everything else, addressed by volume geometry.
    Legacy {
        volume_id: i64,
        local_id: i32,
        secret: i64,
        file_reference: Bytes,
    },
}

impl LocationHandle {
    /// Build the location for a decoded descriptor. Pure mapping on the kind.
    pub fn resolve(descriptor: &MediaDescriptor) -> Result<Self, DescriptorError> {
        if descriptor.kind.is_document_like() {
            return Ok(LocationHandle::Document {
                media_id: descriptor.media_id,
                access_hash: descriptor.access_hash,
                file_reference: descriptor.file_reference.clone(),
                thumb_size: String::new(),
            });
        }

        let geometry = descriptor
            .legacy
            .ok_or(DescriptorError::MissingLegacyGeometry {
                kind: descriptor.kind,
            })?;
        Ok(LocationHandle::Legacy {
            volume_id: geometry.volume_id,
            local_id: geometry.local_id,
            secret: geometry.secret,
            file_reference: descriptor.file_reference.clone(),
        })
    }

    pub fn file_reference(&self) -> &Bytes {
        match self {
            LocationHandle::Document { file_reference, .. }
            | LocationHandle::Legacy { file_reference, .. } => file_reference,
        }
    }

    /// Metric label for the location shape.
    pub fn shape(&self) -> &'static str {
        match self {
            LocationHandle::Document { .. } => "document",
            LocationHandle::Legacy { .. } => "legacy",
        }
    }
}

impl fmt::Display for LocationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationHandle::Document { media_id, .. } => write!(f, "document:{}", media_id),
            LocationHandle::Legacy {
                volume_id,
                local_id,
                ..
            } => write!(f, "legacy:{}:{}", volume_id, local_id),
        }
    }
}

impl fmt::Debug for LocationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationHandle::Document {
                media_id,
                access_hash,
                file_reference,
                thumb_size,
            } => f
                .debug_struct("Document")
                .field("media_id", media_id)
                .field("access_hash", &Redacted::new(access_hash))
                .field("file_reference", &describe_reference(file_reference))
                .field("thumb_size", thumb_size)
                .finish(),
            LocationHandle::Legacy {
                volume_id,
                local_id,
                secret,
                file_reference,
            } => f
                .debug_struct("Legacy")
                .field("volume_id", volume_id)
                .field("local_id", local_id)
                .field("secret", &Redacted::new(secret))
                .field("file_reference", &describe_reference(file_reference))
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{LegacyGeometry, MediaKind};

    fn descriptor(kind: MediaKind, legacy: Option<LegacyGeometry>) -> MediaDescriptor {
        MediaDescriptor {
            kind,
            media_id: 5,
            access_hash: 6,
            file_reference: Bytes::from_static(b"ref"),
            legacy,
        }
    }

    #[test]
    fn test_document_like_kinds_resolve_to_document() {
        for kind in [MediaKind::Video, MediaKind::Document, MediaKind::Audio] {
            let location = LocationHandle::resolve(&descriptor(kind, None)).unwrap();
            assert_eq!(
                location,
                LocationHandle::Document {
                    media_id: 5,
                    access_hash: 6,
                    file_reference: Bytes::from_static(b"ref"),
                    thumb_size: String::new(),
                }
            );
        }
    }

    #[test]
    fn test_legacy_kind_never_resolves_to_document() {
        let geometry = LegacyGeometry {
            volume_id: 11,
            local_id: 12,
            secret: 13,
        };
        for kind in [MediaKind::Photo, MediaKind::Voice, MediaKind::Sticker] {
            let location = LocationHandle::resolve(&descriptor(kind, Some(geometry))).unwrap();
            assert_eq!(location.shape(), "legacy");
            assert_eq!(location.to_string(), "legacy:11:12");
            assert_eq!(location.file_reference().as_ref(), b"ref");
        }
    }

    #[test]
    fn test_document_kind_ignores_stray_geometry() {
        let geometry = LegacyGeometry::default();
        let location =
            LocationHandle::resolve(&descriptor(MediaKind::Video, Some(geometry))).unwrap();
        assert_eq!(location.shape(), "document");
    }

    #[test]
    fn test_legacy_kind_without_geometry_is_rejected() {
        assert_eq!(
            LocationHandle::resolve(&descriptor(MediaKind::Photo, None)),
            Err(DescriptorError::MissingLegacyGeometry {
                kind: MediaKind::Photo
            })
        );
    }

    #[test]
    fn test_debug_hides_credentials() {
        let location = LocationHandle::resolve(&descriptor(MediaKind::Video, None)).unwrap();
        let rendered = format!("{:?}", location);
        assert!(rendered.contains("media_id: 5"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("access_hash: 6"));
    }
}
