use std::future::Future;
use std::sync::Arc;

use gator_core::{FeedId, Timestamp};
use gator_db::{Database, DbError, FeedRecord, InsertPostOutcome, NewPost};
use gator_util_error::FmtCompact as _;
use snafu::{ResultExt as _, Snafu};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use crate::cadence::Cadence;
use crate::document::{SyndicationDocument, SyndicationEntry};
use crate::fetcher::{FeedFetcher, FetchError};
use crate::normalize::normalize_pub_date;

const LOG_TARGET: &str = "gator::agg";

/// What to do with an entry whose publication date can't be understood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryDatePolicy {
    /// Stop ingesting the feed for this cycle; entries stored so far stay
    #[default]
    AbortCycle,
    /// Skip the entry and carry on with the rest
    SkipEntry,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cadence: Cadence,
    pub entry_date_policy: EntryDatePolicy,
}

impl SchedulerConfig {
    pub fn new(cadence: Cadence) -> Self {
        Self {
            cadence,
            entry_date_policy: EntryDatePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No feed registered (or none eligible); nothing was done
    NoFeedAvailable,
    Ingested {
        feed_id: FeedId,
        created: usize,
        /// Entries whose link was already stored
        duplicates: usize,
        /// Entries without a link, or with a bad date under
        /// [`EntryDatePolicy::SkipEntry`]
        skipped: usize,
    },
}

#[derive(Debug, Snafu)]
pub enum CycleError {
    #[snafu(display("Failed to fetch feed {feed_id} ({url})"))]
    FetchFailed {
        feed_id: FeedId,
        url: String,
        source: FetchError,
    },
    #[snafu(display("Entry {link} of feed {feed_id} has an invalid publication date {raw:?}"))]
    EntryTimestampInvalid {
        feed_id: FeedId,
        raw: String,
        link: String,
    },
    #[snafu(display("Storage failure"))]
    StorageFailed { source: DbError },
}

pub type CycleResult<T> = std::result::Result<T, CycleError>;

/// Polls registered feeds, one per tick, least recently fetched first
pub struct Scheduler {
    db: Arc<Database>,
    fetcher: Box<dyn FeedFetcher>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(db: Arc<Database>, fetcher: Box<dyn FeedFetcher>, config: SchedulerConfig) -> Self {
        Self {
            db,
            fetcher,
            config,
        }
    }

    /// Run cycles until `shutdown` resolves
    ///
    /// The first cycle starts right away, then one every cadence. Ticks missed
    /// while a slow cycle was running are dropped, cycles never overlap.
    /// `shutdown` is only observed between cycles: a running cycle is always
    /// finished.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut interval = interval(self.config.cadence.as_duration());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut shutdown = std::pin::pin!(shutdown);

        info!(target: LOG_TARGET, cadence = %self.config.cadence, "Collecting feeds");

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!(target: LOG_TARGET, "Shutting down feed collection");
                    break;
                }
                _ = interval.tick() => {}
            }

            match self.run_cycle().await {
                Ok(CycleOutcome::NoFeedAvailable) => {
                    info!(target: LOG_TARGET, "No feeds to fetch");
                }
                Ok(CycleOutcome::Ingested { .. }) => {}
                Err(err) => {
                    error!(target: LOG_TARGET, err = %err.fmt_compact(), "Cycle failed");
                }
            }
        }
    }

    /// Claim the next feed, fetch it and store its new entries
    ///
    /// The feed counts as fetched from the moment it is claimed, whatever
    /// happens afterwards.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self) -> CycleResult<CycleOutcome> {
        let Some(feed) = self
            .db
            .claim_next_feed(Timestamp::now())
            .await
            .context(StorageFailedSnafu)?
        else {
            return Ok(CycleOutcome::NoFeedAvailable);
        };

        info!(target: LOG_TARGET, feed_id = %feed.id, name = %feed.name, url = %feed.url, "Fetching feed");

        let document = self
            .fetcher
            .fetch(&feed.url)
            .await
            .context(FetchFailedSnafu {
                feed_id: feed.id,
                url: feed.url.clone(),
            })?;

        self.ingest(&feed, document).await
    }

    async fn ingest(
        &self,
        feed: &FeedRecord,
        document: SyndicationDocument,
    ) -> CycleResult<CycleOutcome> {
        let total = document.entries.len();
        let mut created = 0;
        let mut duplicates = 0;
        let mut skipped = 0;

        for entry in document.entries {
            if entry.link.is_empty() {
                warn!(target: LOG_TARGET, feed_id = %feed.id, title = %entry.title, "Skipping entry without a link");
                skipped += 1;
                continue;
            }

            let Some(published_at) = entry_published_at(&entry) else {
                match self.config.entry_date_policy {
                    EntryDatePolicy::AbortCycle => {
                        return EntryTimestampInvalidSnafu {
                            feed_id: feed.id,
                            raw: entry.pub_date,
                            link: entry.link,
                        }
                        .fail();
                    }
                    EntryDatePolicy::SkipEntry => {
                        warn!(
                            target: LOG_TARGET,
                            feed_id = %feed.id,
                            link = %entry.link,
                            raw = %entry.pub_date,
                            "Skipping entry with invalid publication date"
                        );
                        skipped += 1;
                        continue;
                    }
                }
            };

            let new_post = NewPost {
                feed_id: feed.id,
                title: entry.title,
                description: (!entry.description.is_empty()).then_some(entry.description),
                published_at,
                link: entry.link,
            };

            match self
                .db
                .create_post(new_post)
                .await
                .context(StorageFailedSnafu)?
            {
                InsertPostOutcome::Inserted(post) => {
                    debug!(target: LOG_TARGET, post_id = %post.id, link = %post.link, "New post");
                    created += 1;
                }
                InsertPostOutcome::AlreadyPresent { .. } => {
                    duplicates += 1;
                }
            }
        }

        info!(
            target: LOG_TARGET,
            feed_id = %feed.id,
            total,
            created,
            duplicates,
            skipped,
            "Feed ingested"
        );

        Ok(CycleOutcome::Ingested {
            feed_id: feed.id,
            created,
            duplicates,
            skipped,
        })
    }
}

/// `None` if the date is unparsable or before the unix epoch
fn entry_published_at(entry: &SyndicationEntry) -> Option<Timestamp> {
    let date = normalize_pub_date(&entry.pub_date).ok()?;
    Timestamp::try_from(date).ok()
}
