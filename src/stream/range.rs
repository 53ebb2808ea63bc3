use tracing::debug;

/// Inclusive byte interval inside an object: `start <= end < total_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: u64,
}

impl RangeSpec {
    /// The whole object, or `None` for an empty one.
    pub fn full(total_size: u64) -> Option<Self> {
        total_size.checked_sub(1).map(|end| Self { start: 0, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value: `bytes <start>-<end>/<total>`.
    pub fn content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_size)
    }
}

/// What the client asked for, resolved against the object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable `Range` header: serve everything.
    Full,
    Partial(RangeSpec),
    /// The range starts at or beyond the end of the object.
    Unsatisfiable,
}

impl RangeRequest {
    /// Parse a `Range` header value against an object of `total_size` bytes.
    ///
    /// Accepts `bytes=<start>-<end>` and `bytes=<start>-`. Only the first range of
    /// a multi-range header is considered. Anything unparsable falls back to
    /// [`RangeRequest::Full`]; a malformed header never becomes an error.
    pub fn parse(header: Option<&str>, total_size: u64) -> Self {
        let Some(value) = header else {
            return RangeRequest::Full;
        };

        let Some((start, end)) = parse_first_range(value) else {
            debug!(range = value, "ignoring malformed Range header");
            return RangeRequest::Full;
        };

        if end.is_some_and(|end| end < start) {
            debug!(range = value, "ignoring inverted Range header");
            return RangeRequest::Full;
        }

        if start >= total_size {
            return RangeRequest::Unsatisfiable;
        }

        let last = total_size - 1;
        let end = end.map_or(last, |end| end.min(last));
        RangeRequest::Partial(RangeSpec { start, end })
    }

    /// The interval to stream, `None` when there is nothing to send.
    pub fn resolve(&self, total_size: u64) -> Option<RangeSpec> {
        match self {
            RangeRequest::Full => RangeSpec::full(total_size),
            RangeRequest::Partial(spec) => Some(*spec),
            RangeRequest::Unsatisfiable => None,
        }
    }
}

fn parse_first_range(value: &str) -> Option<(u64, Option<u64>)> {
    let ranges = value.trim().strip_prefix("bytes=")?;
    let first = ranges.split(',').next()?.trim();
    let (start, end) = first.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => None,
        end => Some(end.parse().ok()?),
    };
    Some((start, end))
}
