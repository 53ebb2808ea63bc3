use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a chat (container) in the remote store.
///
/// Signed because channel and group ids are negative in the remote protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(i64);

impl ContainerId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Identifier of a message (object) inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(i64);

impl ObjectId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

// ---------------------------------------------------------------------------
// Media objects returned by the lookup collaborator
// ---------------------------------------------------------------------------

/// Which media field of a message carries the playable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSlot {
    Video,
    Document,
    Audio,
}

impl MediaSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSlot::Video => "video",
            MediaSlot::Document => "document",
            MediaSlot::Audio => "audio",
        }
    }

    /// MIME type assumed when neither the object nor its file name says otherwise.
    pub fn default_mime_type(&self) -> &'static str {
        match self {
            MediaSlot::Video => "video/mp4",
            MediaSlot::Document => "application/octet-stream",
            MediaSlot::Audio => "audio/mpeg",
        }
    }
}

impl fmt::Display for MediaSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One media attachment as reported by the lookup collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub file_size: u64,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    /// Opaque encoded reference, decoded by [`crate::descriptor::MediaDescriptor::decode`].
    pub file_ref: String,
}

/// A message resolved from `(container, object)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaObject {
    pub video: Option<MediaFile>,
    pub document: Option<MediaFile>,
    pub audio: Option<MediaFile>,
}

impl MediaObject {
    pub fn with_media(slot: MediaSlot, file: MediaFile) -> Self {
        let mut object = Self::default();
        match slot {
            MediaSlot::Video => object.video = Some(file),
            MediaSlot::Document => object.document = Some(file),
            MediaSlot::Audio => object.audio = Some(file),
        }
        object
    }

    /// First present media in priority order: video, document, audio.
    pub fn primary_media(&self) -> Option<(MediaSlot, &MediaFile)> {
        self.video
            .as_ref()
            .map(|f| (MediaSlot::Video, f))
            .or_else(|| self.document.as_ref().map(|f| (MediaSlot::Document, f)))
            .or_else(|| self.audio.as_ref().map(|f| (MediaSlot::Audio, f)))
    }
}
