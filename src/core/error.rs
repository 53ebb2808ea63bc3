use thiserror::Error;

use super::types::{ContainerId, ObjectId};
use crate::descriptor::MediaKind;

// ---------------------------------------------------------------------------
// Remote source errors (lookup + bounded fetch)
// ---------------------------------------------------------------------------

/// Errors raised by the remote object store collaborators.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("object not found: {container_id}/{object_id}")]
    ObjectNotFound {
        container_id: ContainerId,
        object_id: ObjectId,
    },

    #[error("no stored file for location {location}")]
    LocationNotFound { location: String },

    #[error("access rejected for location {location}")]
    AccessRejected { location: String },

    #[error("remote call failed: {reason}")]
    Remote { reason: String },

    #[error("source I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Remote { .. } | SourceError::Io(_))
    }
}

// ---------------------------------------------------------------------------
// Descriptor errors
// ---------------------------------------------------------------------------

/// Errors decoding an opaque reference or resolving it into a location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("reference is not valid base64: {reason}")]
    InvalidEncoding { reason: String },

    #[error("reference truncated at byte {position}: {needed} more bytes needed")]
    Truncated { position: usize, needed: usize },

    #[error("unsupported reference version {major}")]
    UnsupportedVersion { major: u8 },

    #[error("unknown media kind code {code}")]
    UnknownKind { code: i32 },

    #[error("reference has {count} unexpected trailing bytes")]
    TrailingBytes { count: usize },

    #[error("{kind} reference carries no legacy volume location")]
    MissingLegacyGeometry { kind: MediaKind },
}

// ---------------------------------------------------------------------------
// Delivery errors
// ---------------------------------------------------------------------------

/// Errors surfaced to HTTP clients before any body byte is written.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid identifier: {value}")]
    InvalidIdentifier { value: String },

    #[error("object not found: {container_id}/{object_id}")]
    ObjectNotFound {
        container_id: ContainerId,
        object_id: ObjectId,
    },

    #[error("object {container_id}/{object_id} carries no playable media")]
    NoMedia {
        container_id: ContainerId,
        object_id: ObjectId,
    },

    #[error("media is not streamable: {reason}")]
    UnusableMedia { reason: String },

    #[error("range not satisfiable for object of {total_size} bytes")]
    RangeNotSatisfiable { total_size: u64 },

    #[error("share links unavailable: public base URL is not configured")]
    LinksUnavailable,

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl DeliveryError {
    /// Map a DeliveryError to its HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            DeliveryError::InvalidIdentifier { .. } => 400,
            DeliveryError::ObjectNotFound { .. } => 404,
            DeliveryError::NoMedia { .. } => 404,
            DeliveryError::UnusableMedia { .. } => 400,
            DeliveryError::RangeNotSatisfiable { .. } => 416,
            DeliveryError::LinksUnavailable => 503,
            DeliveryError::Internal { .. } => 500,
        }
    }

    /// Return the error code string for JSON responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            DeliveryError::InvalidIdentifier { .. } => "invalid_identifier",
            DeliveryError::ObjectNotFound { .. } => "object_not_found",
            DeliveryError::NoMedia { .. } => "no_media",
            DeliveryError::UnusableMedia { .. } => "unusable_media",
            DeliveryError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            DeliveryError::LinksUnavailable => "links_unavailable",
            DeliveryError::Internal { .. } => "internal_error",
        }
    }
}
