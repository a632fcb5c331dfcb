//! `Range` header parsing.
//!
//! Parsing is deliberately lenient: numbers are read like a leading-digits
//! integer parse, unusable specs are skipped instead of rejecting the header,
//! and ends past the resource are clamped.

/// Inclusive byte range within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn byte_count(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Outcome of [`parse_range`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// The header is not a range header at all (no `=`)
    Malformed,
    /// No spec in the header overlaps the resource
    Unsatisfiable,
    /// Satisfiable specs in header order
    Ranges(Vec<ByteRange>),
}

/// Parse a `Range` header value against a resource of `size` bytes.
pub fn parse_range(size: u64, header: &str) -> RangeOutcome {
    let Some((_unit, specs)) = header.split_once('=') else {
        return RangeOutcome::Malformed;
    };

    let size = i128::from(size);
    let mut ranges = Vec::new();

    for spec in specs.split(',') {
        let mut bounds = spec.split('-');
        let first = bounds.next().and_then(parse_leading_int);
        let second = bounds.next().and_then(parse_leading_int);

        let (start, mut end) = match (first, second) {
            (None, Some(suffix)) => (size - suffix, size - 1),
            (None, None) => continue,
            (Some(start), None) => (start, size - 1),
            (Some(start), Some(end)) => (start, end),
        };

        if end > size - 1 {
            end = size - 1;
        }
        if start < 0 || start > end {
            continue;
        }

        // Both bounds are within [0, size) here.
        ranges.push(ByteRange {
            start: start as u64,
            end: end as u64,
        });
    }

    if ranges.is_empty() {
        RangeOutcome::Unsatisfiable
    } else {
        RangeOutcome::Ranges(ranges)
    }
}

/// Integer parse that reads an optional sign and the leading digits,
/// ignoring anything after them. `None` when there are no digits.
fn parse_leading_int(input: &str) -> Option<i128> {
    let trimmed = input.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let value: i128 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}
