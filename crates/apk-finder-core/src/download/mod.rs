//! Download gateway.
//!
//! Turns a `(share, path, Range)` request into status, headers and a body
//! stream. Opening goes through an ordered chain of [`StreamStrategy`]s so a
//! flaky share degrades to slower strategies instead of failing the request.

mod disposition;
mod gateway;
mod hashing;
mod range;
mod strategy;

pub use disposition::content_disposition;
pub use gateway::{DownloadGateway, DownloadRequest, DownloadResponse};
pub use hashing::{hash_while_streaming, HashCallback, HashingStream};
pub use range::{parse_range_header, plan_range, RangePlan, RangeSpec};
pub use strategy::{
    default_chain, open_with_chain, skip_and_limit, LocalCopy, OpenOutcome, RangedOpen,
    SequentialSkip, StreamStrategy,
};
