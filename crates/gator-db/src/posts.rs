use std::cmp::Reverse;
use std::collections::HashSet;

use gator_core::{FeedId, PostId, Timestamp, UserId};
use tracing::debug;

use crate::{
    Database, DbResult, FeedNotFoundSnafu, IdSequence, LOG_TARGET, PostRecord,
};
use crate::tables::{feed_follows, feeds, id_sequences, posts, posts_by_link};

#[derive(Debug, Clone)]
pub struct NewPost {
    pub feed_id: FeedId,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Timestamp,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPostOutcome {
    Inserted(PostRecord),
    /// A post with the same link is already stored; nothing was written
    AlreadyPresent { post_id: PostId },
}

impl Database {
    /// Store a post unless its link is already known
    pub async fn create_post(&self, new_post: NewPost) -> DbResult<InsertPostOutcome> {
        self.write_with(|tx| {
            let feeds_table = tx.open_table(&feeds::TABLE)?;
            let mut posts_table = tx.open_table(&posts::TABLE)?;
            let mut posts_by_link_table = tx.open_table(&posts_by_link::TABLE)?;
            let mut id_sequences_table = tx.open_table(&id_sequences::TABLE)?;

            let NewPost {
                feed_id,
                title,
                description,
                published_at,
                link,
            } = new_post;

            if let Some(post_id) = posts_by_link_table.get(&link)?.map(|g| g.value()) {
                debug!(target: LOG_TARGET, %post_id, link = %link, "Post already present");
                return Ok(InsertPostOutcome::AlreadyPresent { post_id });
            }

            if feeds_table.get(&feed_id)?.is_none() {
                return FeedNotFoundSnafu {
                    feed: feed_id.to_string(),
                }
                .fail();
            }

            let id = PostId::new(Self::next_id_tx(
                IdSequence::Post,
                &mut id_sequences_table,
            )?);
            let now = Timestamp::now();
            let record = PostRecord {
                id,
                feed_id,
                title,
                description,
                published_at,
                link,
                created_at: now,
                updated_at: now,
            };

            posts_table.insert(&id, &record)?;
            posts_by_link_table.insert(&record.link, &id)?;

            debug!(target: LOG_TARGET, post_id = %id, %feed_id, link = %record.link, "Created post");
            Ok(InsertPostOutcome::Inserted(record))
        })
        .await
    }

    pub async fn get_post_by_link(&self, link: &str) -> DbResult<Option<PostRecord>> {
        let link = link.to_owned();
        self.read_with(|tx| {
            let posts_table = tx.open_table(&posts::TABLE)?;
            let posts_by_link_table = tx.open_table(&posts_by_link::TABLE)?;

            let Some(id) = posts_by_link_table.get(&link)?.map(|g| g.value()) else {
                return Ok(None);
            };
            Ok(posts_table.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    pub async fn count_posts(&self) -> DbResult<usize> {
        self.read_with(|tx| {
            let posts_table = tx.open_table(&posts::TABLE)?;
            let mut count = 0;
            for result in posts_table.range(..)? {
                result?;
                count += 1;
            }
            Ok(count)
        })
        .await
    }

    /// Newest posts (by publication date) of the feeds `user_id` follows
    pub async fn list_posts_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> DbResult<Vec<PostRecord>> {
        self.read_with(|tx| {
            let feed_follows_table = tx.open_table(&feed_follows::TABLE)?;
            let posts_table = tx.open_table(&posts::TABLE)?;

            let mut followed = HashSet::new();
            for result in feed_follows_table.range(..)? {
                let (key, _value) = result?;
                let (follower, feed_id) = key.value();
                if follower == user_id {
                    followed.insert(feed_id);
                }
            }

            let mut posts = Vec::new();
            if !followed.is_empty() {
                for result in posts_table.range(..)? {
                    let (_key, value) = result?;
                    let post = value.value();
                    if followed.contains(&post.feed_id) {
                        posts.push(post);
                    }
                }
            }

            posts.sort_by_key(|p| Reverse((p.published_at, p.id)));
            posts.truncate(limit);
            Ok(posts)
        })
        .await
    }
}
