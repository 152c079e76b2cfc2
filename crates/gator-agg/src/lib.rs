//! Feed scheduling and ingestion
//!
//! [`Scheduler`] picks the registered feed fetched least recently, fetches its
//! document through a [`FeedFetcher`], and stores entries not seen before as
//! posts.

pub mod cadence;
pub mod document;
pub mod fetcher;
pub mod normalize;
pub mod scheduler;

pub use self::cadence::{Cadence, CadenceParseError};
pub use self::document::{MalformedDocument, SyndicationDocument, SyndicationEntry, parse_document};
pub use self::fetcher::{FeedFetcher, FetchError, FetchResult, HttpFetcher, USER_AGENT};
pub use self::normalize::{DateLayout, InvalidTimestamp, normalize_pub_date};
pub use self::scheduler::{
    CycleError, CycleOutcome, CycleResult, EntryDatePolicy, Scheduler, SchedulerConfig,
};
