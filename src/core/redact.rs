use std::fmt;

// ---------------------------------------------------------------------------
// Sensitive field redaction
// ---------------------------------------------------------------------------

/// A wrapper that redacts its contents when displayed or debug-printed.
///
/// Access hashes, secrets and object references authorize reads against the
/// remote store, so they never reach log output.
///
/// Usage:
/// ```ignore
/// let hash = Redacted::new(access_hash);
/// tracing::debug!(access_hash = %hash, "resolving"); // logs: access_hash=[REDACTED]
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Redacted<T>(T);

impl<T> Redacted<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Describe an object reference by length only: `<12 bytes>`.
pub fn describe_reference(reference: &[u8]) -> String {
    format!("<{} bytes>", reference.len())
}
