use gator_core::{FeedId, Timestamp, UserId};
use tracing::info;

use crate::{
    AlreadyFollowingSnafu, Database, DbResult, FeedFollowRecord, FeedNotFoundSnafu, FeedRecord,
    LOG_TARGET, NotFollowingSnafu, UserNotFoundSnafu, UserRecord,
};
use crate::tables::{feed_follows, feeds, feeds_by_url, users};

/// A follow, joined with the user and feed it links
#[derive(Debug, Clone)]
pub struct FeedFollow {
    pub user: UserRecord,
    pub feed: FeedRecord,
}

impl Database {
    pub async fn create_feed_follow(&self, user_id: UserId, feed_id: FeedId) -> DbResult<FeedFollow> {
        self.write_with(|tx| {
            let users_table = tx.open_table(&users::TABLE)?;
            let feeds_table = tx.open_table(&feeds::TABLE)?;
            let mut feed_follows_table = tx.open_table(&feed_follows::TABLE)?;

            let Some(user) = users_table.get(&user_id)?.map(|g| g.value()) else {
                return UserNotFoundSnafu {
                    user: user_id.to_string(),
                }
                .fail();
            };
            let Some(feed) = feeds_table.get(&feed_id)?.map(|g| g.value()) else {
                return FeedNotFoundSnafu {
                    feed: feed_id.to_string(),
                }
                .fail();
            };

            if feed_follows_table.get(&(user_id, feed_id))?.is_some() {
                return AlreadyFollowingSnafu { url: feed.url }.fail();
            }

            let now = Timestamp::now();
            let record = FeedFollowRecord {
                created_at: now,
                updated_at: now,
            };
            feed_follows_table.insert(&(user_id, feed_id), &record)?;

            info!(target: LOG_TARGET, %user_id, %feed_id, "Created feed follow");
            Ok(FeedFollow { user, feed })
        })
        .await
    }

    /// Feeds followed by `user_id`, in the order they were registered
    pub async fn list_feed_follows_for_user(&self, user_id: UserId) -> DbResult<Vec<FeedRecord>> {
        self.read_with(|tx| {
            let feeds_table = tx.open_table(&feeds::TABLE)?;
            let feed_follows_table = tx.open_table(&feed_follows::TABLE)?;

            let mut followed = Vec::new();
            for result in feed_follows_table.range(..)? {
                let (key, _value) = result?;
                let (follower, feed_id) = key.value();
                if follower != user_id {
                    continue;
                }
                if let Some(feed) = feeds_table.get(&feed_id)?.map(|g| g.value()) {
                    followed.push(feed);
                }
            }

            followed.sort_by_key(|f| f.id);
            Ok(followed)
        })
        .await
    }

    pub async fn delete_feed_follow_by_url(&self, user_id: UserId, url: &str) -> DbResult<()> {
        let url = url.to_owned();
        self.write_with(|tx| {
            let feeds_table = tx.open_table(&feeds::TABLE)?;
            let feeds_by_url_table = tx.open_table(&feeds_by_url::TABLE)?;
            let mut feed_follows_table = tx.open_table(&feed_follows::TABLE)?;

            let Some(feed) = Self::get_feed_by_url_tx(&url, &feeds_table, &feeds_by_url_table)?
            else {
                return FeedNotFoundSnafu { feed: url }.fail();
            };

            if feed_follows_table.remove(&(user_id, feed.id))?.is_none() {
                return NotFollowingSnafu { url }.fail();
            }

            info!(target: LOG_TARGET, %user_id, feed_id = %feed.id, "Removed feed follow");
            Ok(())
        })
        .await
    }
}
