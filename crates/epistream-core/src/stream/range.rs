//! `Range: bytes=...` parsing and resolution against a known length.

/// A single byte range as requested by the client, before the object
/// length is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No (usable) Range header: the whole object.
    Full,
    /// `bytes=a-`
    From(u64),
    /// `bytes=a-b`, `b` inclusive.
    Bounded { start: u64, end: u64 },
    /// `bytes=-n`: the last `n` bytes.
    Suffix(u64),
}

/// Concrete half-open byte window `[start, end)` of an object of `total` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
    /// True when the client asked for a range (206 rather than 200).
    pub partial: bool,
}

impl ResolvedRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// `Content-Range` value, e.g. `bytes 0-99/1000`.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end.saturating_sub(1), self.total)
    }
}

impl RangeRequest {
    /// Parse a `Range` header value. Malformed or multi-range values fall
    /// back to `Full`, as HTTP allows a server to ignore them.
    pub fn parse(header: Option<&str>) -> Self {
        let Some(spec) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
            return RangeRequest::Full;
        };
        if spec.contains(',') {
            return RangeRequest::Full;
        }
        let Some((a, b)) = spec.split_once('-') else {
            return RangeRequest::Full;
        };
        let (a, b) = (a.trim(), b.trim());
        match (a.is_empty(), b.is_empty()) {
            (true, false) => b.parse().map(RangeRequest::Suffix).unwrap_or(RangeRequest::Full),
            (false, true) => a.parse().map(RangeRequest::From).unwrap_or(RangeRequest::Full),
            (false, false) => match (a.parse(), b.parse()) {
                (Ok(start), Ok(end)) if start <= end => RangeRequest::Bounded { start, end },
                _ => RangeRequest::Full,
            },
            (true, true) => RangeRequest::Full,
        }
    }

    /// Resolve against the object length. `Err(total)` means the range is
    /// not satisfiable.
    pub fn resolve(self, total: u64) -> Result<ResolvedRange, u64> {
        let (start, end, partial) = match self {
            RangeRequest::Full => (0, total, false),
            RangeRequest::From(start) => (start, total, true),
            RangeRequest::Bounded { start, end } => (start, end.saturating_add(1).min(total), true),
            RangeRequest::Suffix(0) => return Err(total),
            RangeRequest::Suffix(n) => (total.saturating_sub(n), total, true),
        };
        if partial && start >= total {
            return Err(total);
        }
        Ok(ResolvedRange {
            start,
            end,
            total,
            partial,
        })
    }
}
