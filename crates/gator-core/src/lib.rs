pub mod id;
mod timestamp;

pub use self::id::{FeedId, PostId, UserId};
pub use self::timestamp::{Timestamp, TimestampOutOfRange};
