//! HTTP `Range` header handling.
//!
//! Only single `bytes=` ranges are honoured. Anything malformed, any other
//! unit and multi-range requests are ignored and served as a full response.

use crate::error::{ApkFinderError, Result};
use crate::share::ByteRange;

/// One parsed range from a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=start-end`, inclusive.
    Bounded { start: u64, end: u64 },
    /// `bytes=start-`
    From { start: u64 },
    /// `bytes=-length`, the last `length` bytes.
    Suffix { length: u64 },
}

/// Parse a `Range` header value. `None` means "ignore the header".
pub fn parse_range_header(value: &str) -> Option<RangeSpec> {
    let (unit, spec) = value.trim().split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") || spec.contains(',') {
        return None;
    }

    let (start, end) = spec.trim().split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (false, false) => Some(RangeSpec::Bounded {
            start: start.parse().ok()?,
            end: end.parse().ok()?,
        }),
        (false, true) => Some(RangeSpec::From {
            start: start.parse().ok()?,
        }),
        (true, false) => Some(RangeSpec::Suffix {
            length: end.parse().ok()?,
        }),
        (true, true) => None,
    }
}

/// How a download will be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePlan {
    /// Bytes to read from the file, `None` for the whole file.
    pub range: Option<ByteRange>,
    /// 200 or 206.
    pub status: u16,
    pub content_range: Option<String>,
    pub content_length: Option<u64>,
}

impl RangePlan {
    fn full(size: Option<u64>) -> Self {
        Self {
            range: None,
            status: 200,
            content_range: None,
            content_length: size,
        }
    }

    /// `start..=end` of a file whose size is known, so `end < size`.
    fn partial(start: u64, end: u64, size: u64) -> Self {
        Self {
            range: Some(ByteRange::new(start, Some(end))),
            status: 206,
            content_range: Some(format!("bytes {}-{}/{}", start, end, size)),
            content_length: Some(end - start + 1),
        }
    }

    /// `start..=end` of a file of unknown size. The body may end early, so no
    /// length is promised and the response is sent chunked.
    fn partial_unsized(start: u64, end: u64) -> Self {
        Self {
            range: Some(ByteRange::new(start, Some(end))),
            status: 206,
            content_range: Some(format!("bytes {}-{}/*", start, end)),
            content_length: None,
        }
    }
}

/// Decide how to answer `spec` for a file of `size` bytes.
///
/// With a known size an unsatisfiable range is an
/// [`ApkFinderError::InvalidRange`]. With an unknown size the range is
/// trusted as far as it can be: a bounded range becomes `bytes s-e/*` with
/// no `Content-Length`, an open-ended one skips the prefix with no
/// `Content-Range`, and a suffix range is ignored.
pub fn plan_range(spec: Option<RangeSpec>, size: Option<u64>) -> Result<RangePlan> {
    let Some(spec) = spec else {
        return Ok(RangePlan::full(size));
    };

    match size {
        Some(size) => {
            let (start, end) = match spec {
                RangeSpec::Bounded { start, end } => (start, end),
                RangeSpec::From { start } => (start, size.saturating_sub(1)),
                RangeSpec::Suffix { length } if length > 0 => {
                    (size.saturating_sub(length), size.saturating_sub(1))
                }
                RangeSpec::Suffix { .. } => return Err(ApkFinderError::InvalidRange { size }),
            };
            if size == 0 || start >= size || end >= size || start > end {
                return Err(ApkFinderError::InvalidRange { size });
            }
            Ok(RangePlan::partial(start, end, size))
        }
        None => match spec {
            RangeSpec::Bounded { start, end } if start <= end => {
                Ok(RangePlan::partial_unsized(start, end))
            }
            RangeSpec::From { start } if start > 0 => Ok(RangePlan {
                range: Some(ByteRange::new(start, None)),
                status: 206,
                content_range: None,
                content_length: None,
            }),
            _ => Ok(RangePlan::full(None)),
        },
    }
}
