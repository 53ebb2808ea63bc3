//! Opaque media references.
//!
//! A reference is URL-safe base64 (no padding) over a zero-run-length-encoded,
//! little-endian record:
//!
//! ```text
//! i32   kind | FILE_REFERENCE_FLAG
//! bytes file_reference            (only when the flag is set)
//! i64   media_id
//! i64   access_hash
//! i64   volume_id                 (legacy kinds only)
//! i32   local_id                  (legacy kinds only)
//! i64   secret                    (legacy kinds only)
//! u8    minor version
//! u8    major version             (= 4)
//! ```

mod codec;

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;

use crate::core::error::DescriptorError;
use crate::core::redact::{describe_reference, Redacted};

pub const REFERENCE_MAJOR_VERSION: u8 = 4;
pub const REFERENCE_MINOR_VERSION: u8 = 30;

const FILE_REFERENCE_FLAG: i32 = 1 << 25;

// ---------------------------------------------------------------------------
// Media kinds
// ---------------------------------------------------------------------------

/// Kind of stored object, as numbered by the remote protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Thumbnail,
    ChatPhoto,
    Photo,
    Voice,
    Video,
    Document,
    Encrypted,
    Temp,
    Sticker,
    Audio,
    Animation,
    EncryptedThumbnail,
    Wallpaper,
    VideoNote,
    SecureRaw,
    Secure,
    Background,
    DocumentAsFile,
}

impl MediaKind {
    const ALL: [MediaKind; 18] = [
        MediaKind::Thumbnail,
        MediaKind::ChatPhoto,
        MediaKind::Photo,
        MediaKind::Voice,
        MediaKind::Video,
        MediaKind::Document,
        MediaKind::Encrypted,
        MediaKind::Temp,
        MediaKind::Sticker,
        MediaKind::Audio,
        MediaKind::Animation,
        MediaKind::EncryptedThumbnail,
        MediaKind::Wallpaper,
        MediaKind::VideoNote,
        MediaKind::SecureRaw,
        MediaKind::Secure,
        MediaKind::Background,
        MediaKind::DocumentAsFile,
    ];

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Kinds addressed by `(media_id, access_hash)`; everything else uses the
    /// legacy volume location.
    pub fn is_document_like(self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Document | MediaKind::Audio)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Thumbnail => "thumbnail",
            MediaKind::ChatPhoto => "chat_photo",
            MediaKind::Photo => "photo",
            MediaKind::Voice => "voice",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Encrypted => "encrypted",
            MediaKind::Temp => "temp",
            MediaKind::Sticker => "sticker",
            MediaKind::Audio => "audio",
            MediaKind::Animation => "animation",
            MediaKind::EncryptedThumbnail => "encrypted_thumbnail",
            MediaKind::Wallpaper => "wallpaper",
            MediaKind::VideoNote => "video_note",
            MediaKind::SecureRaw => "secure_raw",
            MediaKind::Secure => "secure",
            MediaKind::Background => "background",
            MediaKind::DocumentAsFile => "document_as_file",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Volume-addressed location fields of legacy objects.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyGeometry {
    pub volume_id: i64,
    pub local_id: i32,
    pub secret: i64,
}

impl fmt::Debug for LegacyGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyGeometry")
            .field("volume_id", &self.volume_id)
            .field("local_id", &self.local_id)
            .field("secret", &Redacted::new(self.secret))
            .finish()
    }
}

/// Decoded form of an opaque media reference.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    pub media_id: i64,
    pub access_hash: i64,
    pub file_reference: Bytes,
    /// Present for legacy kinds after decoding.
    pub legacy: Option<LegacyGeometry>,
}

impl fmt::Debug for MediaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaDescriptor")
            .field("kind", &self.kind)
            .field("media_id", &self.media_id)
            .field("access_hash", &Redacted::new(self.access_hash))
            .field("file_reference", &describe_reference(&self.file_reference))
            .field("legacy", &self.legacy)
            .finish()
    }
}

impl MediaDescriptor {
    pub fn decode(encoded: &str) -> Result<Self, DescriptorError> {
        let packed = URL_SAFE_NO_PAD
            .decode(encoded.trim().trim_end_matches('='))
            .map_err(|e| DescriptorError::InvalidEncoding {
                reason: e.to_string(),
            })?;
        let raw = codec::rle_decode(&packed);

        let (&major, rest) = raw.split_last().ok_or(DescriptorError::Truncated {
            position: 0,
            needed: 2,
        })?;
        if major != REFERENCE_MAJOR_VERSION {
            return Err(DescriptorError::UnsupportedVersion { major });
        }
        let (_minor, body) = rest.split_last().ok_or(DescriptorError::Truncated {
            position: 0,
            needed: 1,
        })?;

        let mut reader = codec::Reader::new(body);
        let header = reader.read_i32()?;
        let code = header & !FILE_REFERENCE_FLAG;
        let kind = MediaKind::from_code(code).ok_or(DescriptorError::UnknownKind { code })?;

        let file_reference = if header & FILE_REFERENCE_FLAG != 0 {
            Bytes::from(reader.read_prefixed_bytes()?)
        } else {
            Bytes::new()
        };
        let media_id = reader.read_i64()?;
        let access_hash = reader.read_i64()?;

        let legacy = if kind.is_document_like() {
            None
        } else {
            Some(LegacyGeometry {
                volume_id: reader.read_i64()?,
                local_id: reader.read_i32()?,
                secret: reader.read_i64()?,
            })
        };
        reader.finish()?;

        Ok(Self {
            kind,
            media_id,
            access_hash,
            file_reference,
            legacy,
        })
    }

    /// Encode into the opaque reference form accepted by [`MediaDescriptor::decode`].
    ///
    /// Legacy kinds without geometry are written with zeroed geometry.
    pub fn encode(&self) -> String {
        let mut writer = codec::Writer::default();

        let mut header = self.kind.code();
        if !self.file_reference.is_empty() {
            header |= FILE_REFERENCE_FLAG;
        }
        writer.put_i32(header);
        if !self.file_reference.is_empty() {
            writer.put_prefixed_bytes(&self.file_reference);
        }
        writer.put_i64(self.media_id);
        writer.put_i64(self.access_hash);

        if !self.kind.is_document_like() {
            let geometry = self.legacy.unwrap_or_default();
            writer.put_i64(geometry.volume_id);
            writer.put_i32(geometry.local_id);
            writer.put_i64(geometry.secret);
        }

        writer.put_u8(REFERENCE_MINOR_VERSION);
        writer.put_u8(REFERENCE_MAJOR_VERSION);

        URL_SAFE_NO_PAD.encode(codec::rle_encode(&writer.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_REF: &str = "BAACAgMBAgMqAAf5_________x4E";
    const PHOTO_REF: &str = "AgACAgKquwARFc1bBwAETQADnf________8eBA";

    #[test]
    fn test_decode_known_video_reference() {
        let descriptor = MediaDescriptor::decode(VIDEO_REF).unwrap();
        assert_eq!(descriptor.kind, MediaKind::Video);
        assert_eq!(descriptor.media_id, 42);
        assert_eq!(descriptor.access_hash, -7);
        assert_eq!(descriptor.file_reference.as_ref(), &[1, 2, 3]);
        assert!(descriptor.legacy.is_none());
        assert_eq!(descriptor.encode(), VIDEO_REF);
    }

    #[test]
    fn test_decode_known_legacy_reference() {
        let descriptor = MediaDescriptor::decode(PHOTO_REF).unwrap();
        assert_eq!(descriptor.kind, MediaKind::Photo);
        assert_eq!(
            descriptor.legacy,
            Some(LegacyGeometry {
                volume_id: 123_456_789,
                local_id: 77,
                secret: -99,
            })
        );
        assert_eq!(descriptor.file_reference.as_ref(), &[0xAA, 0xBB]);
        assert_eq!(descriptor.encode(), PHOTO_REF);
    }

    #[test]
    fn test_decode_accepts_padding() {
        let padded = format!("{}==", PHOTO_REF);
        assert!(MediaDescriptor::decode(&padded).is_ok());
    }

    #[test]
    fn test_reference_without_file_reference() {
        let descriptor = MediaDescriptor::decode("BQADAQAHAQAHHgQ").unwrap();
        assert_eq!(descriptor.kind, MediaKind::Document);
        assert!(descriptor.file_reference.is_empty());
        assert_eq!(descriptor.media_id, 1);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            MediaDescriptor::decode("not base64!"),
            Err(DescriptorError::InvalidEncoding { .. })
        ));
        assert!(matches!(
            MediaDescriptor::decode(""),
            Err(DescriptorError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_other_versions() {
        let descriptor = MediaDescriptor::decode(VIDEO_REF).unwrap();
        let mut raw = codec::rle_decode(&URL_SAFE_NO_PAD.decode(descriptor.encode()).unwrap());
        *raw.last_mut().unwrap() = 3;
        let encoded = URL_SAFE_NO_PAD.encode(codec::rle_encode(&raw));
        assert_eq!(
            MediaDescriptor::decode(&encoded),
            Err(DescriptorError::UnsupportedVersion { major: 3 })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_kind_and_trailing_bytes() {
        let mut writer = codec::Writer::default();
        writer.put_i32(99);
        writer.put_i64(1);
        writer.put_i64(1);
        writer.put_u8(REFERENCE_MINOR_VERSION);
        writer.put_u8(REFERENCE_MAJOR_VERSION);
        let encoded = URL_SAFE_NO_PAD.encode(codec::rle_encode(&writer.into_inner()));
        assert_eq!(
            MediaDescriptor::decode(&encoded),
            Err(DescriptorError::UnknownKind { code: 99 })
        );

        let mut writer = codec::Writer::default();
        writer.put_i32(MediaKind::Audio.code());
        writer.put_i64(1);
        writer.put_i64(1);
        writer.put_i32(5);
        writer.put_u8(REFERENCE_MINOR_VERSION);
        writer.put_u8(REFERENCE_MAJOR_VERSION);
        let encoded = URL_SAFE_NO_PAD.encode(codec::rle_encode(&writer.into_inner()));
        assert_eq!(
            MediaDescriptor::decode(&encoded),
            Err(DescriptorError::TrailingBytes { count: 4 })
        );
    }

    #[test]
    fn test_debug_hides_credentials() {
        let descriptor = MediaDescriptor::decode(PHOTO_REF).unwrap();
        let rendered = format!("{:?}", descriptor);
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("<2 bytes>"));
        assert!(!rendered.contains("-99"));
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(MediaKind::from_code(4), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_code(9), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_code(-1), None);
        assert_eq!(MediaKind::DocumentAsFile.code(), 17);
        assert!(MediaKind::Document.is_document_like());
        assert!(!MediaKind::Sticker.is_document_like());
    }
}
