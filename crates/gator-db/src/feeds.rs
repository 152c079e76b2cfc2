use gator_core::{FeedId, Timestamp, UserId};
use tracing::{debug, info};

use crate::{
    Database, DbResult, FeedNotFoundSnafu, FeedRecord, FeedUrlExistsSnafu, IdSequence, LOG_TARGET,
    UserNotFoundSnafu,
};
use crate::tables::{feeds, feeds_by_url, id_sequences, users};

#[derive(Debug, Clone)]
pub struct NewFeed {
    pub name: String,
    pub url: String,
    pub user_id: UserId,
}

impl Database {
    /// Register a feed; source urls are unique across all feeds
    pub async fn create_feed(&self, new_feed: NewFeed) -> DbResult<FeedRecord> {
        self.write_with(|tx| {
            let users_table = tx.open_table(&users::TABLE)?;
            let mut feeds_table = tx.open_table(&feeds::TABLE)?;
            let mut feeds_by_url_table = tx.open_table(&feeds_by_url::TABLE)?;
            let mut id_sequences_table = tx.open_table(&id_sequences::TABLE)?;

            let NewFeed { name, url, user_id } = new_feed;

            if users_table.get(&user_id)?.is_none() {
                return UserNotFoundSnafu {
                    user: user_id.to_string(),
                }
                .fail();
            }
            if feeds_by_url_table.get(&url)?.is_some() {
                return FeedUrlExistsSnafu { url }.fail();
            }

            let id = FeedId::new(Self::next_id_tx(
                IdSequence::Feed,
                &mut id_sequences_table,
            )?);
            let now = Timestamp::now();
            let record = FeedRecord {
                id,
                name,
                url,
                user_id,
                created_at: now,
                updated_at: now,
                last_fetched: None,
            };

            feeds_table.insert(&id, &record)?;
            feeds_by_url_table.insert(&record.url, &id)?;

            info!(target: LOG_TARGET, feed_id = %id, url = %record.url, "Created feed");
            Ok(record)
        })
        .await
    }

    pub async fn get_feed(&self, id: FeedId) -> DbResult<Option<FeedRecord>> {
        self.read_with(|tx| {
            let feeds_table = tx.open_table(&feeds::TABLE)?;
            Ok(feeds_table.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    pub async fn get_feed_by_url(&self, url: &str) -> DbResult<Option<FeedRecord>> {
        let url = url.to_owned();
        self.read_with(|tx| {
            let feeds_table = tx.open_table(&feeds::TABLE)?;
            let feeds_by_url_table = tx.open_table(&feeds_by_url::TABLE)?;
            Self::get_feed_by_url_tx(&url, &feeds_table, &feeds_by_url_table)
        })
        .await
    }

    pub(crate) fn get_feed_by_url_tx(
        url: &String,
        feeds_table: &impl feeds::ReadableTable,
        feeds_by_url_table: &impl feeds_by_url::ReadableTable,
    ) -> DbResult<Option<FeedRecord>> {
        let Some(id) = feeds_by_url_table.get(url)?.map(|g| g.value()) else {
            return Ok(None);
        };
        Ok(feeds_table.get(&id)?.map(|g| g.value()))
    }

    /// All feeds, in registration order
    pub async fn list_feeds(&self) -> DbResult<Vec<FeedRecord>> {
        self.read_with(|tx| {
            let feeds_table = tx.open_table(&feeds::TABLE)?;
            let mut feeds = Vec::new();

            for result in feeds_table.range(..)? {
                let (_key, value) = result?;
                feeds.push(value.value());
            }

            feeds.sort_by_key(|f| f.id);
            Ok(feeds)
        })
        .await
    }

    /// The feed that should be polled next, as of now
    ///
    /// See [`Self::select_next_feed_tx`] for the ordering.
    pub async fn select_least_recently_fetched_feed(&self) -> DbResult<Option<FeedRecord>> {
        let now = Timestamp::now();
        self.read_with(|tx| {
            let feeds_table = tx.open_table(&feeds::TABLE)?;
            Self::select_next_feed_tx(now, &feeds_table)
        })
        .await
    }

    /// Pick the feed fetched least recently, at or before `now`
    ///
    /// Never-fetched feeds come first. Ties go to the lowest feed id. Feeds
    /// with a `last_fetched` later than `now` are not eligible.
    pub fn select_next_feed_tx(
        now: Timestamp,
        feeds_table: &impl feeds::ReadableTable,
    ) -> DbResult<Option<FeedRecord>> {
        let mut best: Option<FeedRecord> = None;

        for result in feeds_table.range(..)? {
            let (_key, value) = result?;
            let feed = value.value();

            if feed.last_fetched.is_some_and(|last| now < last) {
                continue;
            }

            let is_better = best
                .as_ref()
                .is_none_or(|b| (feed.last_fetched, feed.id) < (b.last_fetched, b.id));
            if is_better {
                best = Some(feed);
            }
        }

        Ok(best)
    }

    pub async fn mark_feed_fetched(&self, id: FeedId) -> DbResult<()> {
        self.mark_feed_fetched_at(id, Timestamp::now()).await
    }

    pub async fn mark_feed_fetched_at(&self, id: FeedId, fetched_at: Timestamp) -> DbResult<()> {
        self.write_with(|tx| {
            let mut feeds_table = tx.open_table(&feeds::TABLE)?;
            Self::mark_feed_fetched_tx(id, fetched_at, &mut feeds_table)?;
            Ok(())
        })
        .await
    }

    fn mark_feed_fetched_tx(
        id: FeedId,
        fetched_at: Timestamp,
        feeds_table: &mut feeds::Table,
    ) -> DbResult<FeedRecord> {
        let Some(mut record) = feeds_table.get(&id)?.map(|g| g.value()) else {
            return FeedNotFoundSnafu {
                feed: id.to_string(),
            }
            .fail();
        };

        record.last_fetched = Some(fetched_at);
        record.updated_at = fetched_at;
        feeds_table.insert(&id, &record)?;

        Ok(record)
    }

    /// Atomically select the next feed to poll and mark it fetched at `now`
    ///
    /// The claim is committed before the caller starts fetching, so a feed
    /// that fails or hangs moves to the back of the queue instead of being
    /// picked again on the next cycle.
    pub async fn claim_next_feed(&self, now: Timestamp) -> DbResult<Option<FeedRecord>> {
        self.write_with(|tx| {
            let mut feeds_table = tx.open_table(&feeds::TABLE)?;

            let Some(feed) = Self::select_next_feed_tx(now, &feeds_table)? else {
                debug!(target: LOG_TARGET, "No feed eligible for polling");
                return Ok(None);
            };

            let claimed = Self::mark_feed_fetched_tx(feed.id, now, &mut feeds_table)?;
            debug!(
                target: LOG_TARGET,
                feed_id = %claimed.id,
                previous = ?feed.last_fetched,
                "Claimed feed"
            );
            Ok(Some(claimed))
        })
        .await
    }
}
