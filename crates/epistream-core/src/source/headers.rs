//! Response header parsing for source transfers.

/// Length/offset facts from one response header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct ResponseHead {
    pub status: u32,
    pub content_length: Option<u64>,
    /// `(start, total)` from `Content-Range: bytes start-end/total`.
    pub content_range: Option<(u64, Option<u64>)>,
}

impl ResponseHead {
    /// Offset of the first body byte and the full object length.
    pub fn placement(&self) -> (u64, Option<u64>) {
        match (self.status, self.content_range) {
            (206, Some((start, total))) => {
                let total = total.or_else(|| self.content_length.map(|l| start + l));
                (start, total)
            }
            _ => (0, self.content_length),
        }
    }
}

/// Parse raw header lines. When redirects produce several blocks, only the
/// last status line and what follows it count.
pub(super) fn parse_head(lines: &[String]) -> ResponseHead {
    let mut head = ResponseHead::default();
    for line in lines {
        if line.starts_with("HTTP/") {
            head = ResponseHead {
                status: line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0),
                ..ResponseHead::default()
            };
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            head.content_length = value.parse().ok();
        } else if name.eq_ignore_ascii_case("content-range") {
            head.content_range = parse_content_range(value);
        }
    }
    head
}

fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let total = total.trim().parse().ok();
    Some((start, total))
}
