//! `Range` request header parsing.
//!
//! Only a single `bytes=` range is honored. Anything else (other units,
//! multiple ranges, garbage) parses to `None` and the caller serves the whole
//! file, as HTTP allows a server to ignore a range it does not understand.

/// One requested byte range, before it is checked against the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-` or `bytes=start-end` (`end` inclusive).
    From { start: u64, end: Option<u64> },
    /// `bytes=-N`: the last `N` bytes.
    Suffix(u64),
}

impl ByteRange {
    pub fn parse(header: &str) -> Option<Self> {
        let (unit, spec) = header.trim().split_once('=')?;
        if !unit.trim().eq_ignore_ascii_case("bytes") || spec.contains(',') {
            return None;
        }
        let (first, last) = spec.trim().split_once('-')?;
        let (first, last) = (first.trim(), last.trim());
        if first.is_empty() {
            return parse_position(last).map(Self::Suffix);
        }
        let start = parse_position(first)?;
        let end = if last.is_empty() {
            None
        } else {
            Some(parse_position(last)?)
        };
        Some(Self::From { start, end })
    }

    /// Inclusive `(start, end)` within a file of `size` bytes, with `end`
    /// clamped to the last byte. `None` when nothing of the file is covered.
    pub fn resolve(self, size: u64) -> Option<(u64, u64)> {
        let last = size.checked_sub(1)?;
        match self {
            Self::From { start, end } => {
                let end = end.map_or(last, |end| end.min(last));
                (start <= end).then_some((start, end))
            }
            Self::Suffix(length) => (length > 0).then(|| (size.saturating_sub(length), last)),
        }
    }
}

fn parse_position(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
