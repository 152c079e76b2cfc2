use bincode::{Decode, Encode};
use gator_core::{FeedId, PostId, Timestamp, UserId};

#[macro_export]
macro_rules! def_table {
    ($(#[$outer:meta])*
        $name:ident : $k:ty => $v:ty) => {
        #[allow(unused)]
        $(#[$outer])*
        pub mod $name {
            use super::*;
            pub type Key = $k;
            pub type Value = $v;
            pub type Definition<'a> = redb_bincode::TableDefinition<'a, Key, Value>;
            pub trait ReadableTable: redb_bincode::ReadableTable<Key, Value> {}
            impl<RT> ReadableTable for RT where RT: redb_bincode::ReadableTable<Key, Value> {}
            pub type Table<'a> = redb_bincode::Table<'a, Key, Value>;
            pub const TABLE: Definition = redb_bincode::TableDefinition::new(stringify!($name));
        }
    };
}

def_table! {
    /// Tracks database/schema version
    db_version: () => u64
}

def_table! {
    /// Last id handed out, per kind of record
    id_sequences: IdSequence => u64
}

// USERS
def_table!(users: UserId => UserRecord);
def_table! {
    /// Enforces unique user names
    users_by_name: String => UserId
}

// FEEDS
def_table!(feeds: FeedId => FeedRecord);
def_table! {
    /// Enforces unique feed source urls
    feeds_by_url: String => FeedId
}
def_table!(feed_follows: (UserId, FeedId) => FeedFollowRecord);

// POSTS
def_table!(posts: PostId => PostRecord);
def_table! {
    /// Enforces unique post links; a link is stored at most once
    posts_by_link: String => PostId
}

#[derive(Debug, Encode, Decode, Clone, Copy, PartialEq, Eq)]
pub enum IdSequence {
    User,
    Feed,
    Post,
}

#[derive(Debug, Encode, Decode, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Encode, Decode, Clone, PartialEq, Eq)]
pub struct FeedRecord {
    pub id: FeedId,
    pub name: String,
    pub url: String,
    pub user_id: UserId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Set when the scheduler claims the feed, before it is fetched
    pub last_fetched: Option<Timestamp>,
}

#[derive(Debug, Encode, Decode, Clone, Copy, PartialEq, Eq)]
pub struct FeedFollowRecord {
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Encode, Decode, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub id: PostId,
    pub feed_id: FeedId,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Timestamp,
    pub link: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
