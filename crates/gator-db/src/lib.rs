mod feeds;
mod follows;
mod posts;
mod tables;
mod users;

use std::path::PathBuf;
use std::result;

use redb_bincode::{ReadTransaction, WriteTransaction};
use snafu::{Location, ResultExt as _, Snafu};
use tokio::task::JoinError;
use tracing::{debug, info, instrument};

pub use self::feeds::NewFeed;
pub use self::follows::FeedFollow;
pub use self::posts::{InsertPostOutcome, NewPost};
pub use self::tables::*;

const LOG_TARGET: &str = "gator::db";

/// Current schema version; bumped on incompatible changes to the tables
const DB_VERSION: u64 = 0;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DbError {
    #[snafu(display("Failed to open database"))]
    Database {
        source: redb::DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Table {
        source: redb::TableError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Storage {
        source: redb::StorageError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to start database transaction"))]
    Transaction {
        source: redb::TransactionError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to commit database transaction"))]
    Commit {
        source: redb::CommitError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Database version {db_ver} is newer than supported {code_ver}"))]
    DbVersionTooHigh {
        db_ver: u64,
        code_ver: u64,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to create database directory"))]
    DataDir {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
    Join {
        source: JoinError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("User {name} already exists"))]
    UserExists { name: String },
    #[snafu(display("User {user} not found"))]
    UserNotFound { user: String },
    #[snafu(display("Feed with url {url} already exists"))]
    FeedUrlExists { url: String },
    #[snafu(display("Feed {feed} not found"))]
    FeedNotFound { feed: String },
    #[snafu(display("Already following feed {url}"))]
    AlreadyFollowing { url: String },
    #[snafu(display("Not following feed {url}"))]
    NotFollowing { url: String },
    #[snafu(display("Id sequence exhausted"))]
    Overflow,
}

pub type DbResult<T> = result::Result<T, DbError>;

/// Persistent store of users, feeds, follows and posts
///
/// Every operation runs in its own transaction; write operations that must
/// be atomic (e.g. claiming the next feed to poll) do all of their reads and
/// writes within a single write transaction.
#[derive(Debug)]
pub struct Database {
    inner: redb_bincode::Database,
}

impl Database {
    #[instrument(skip_all)]
    pub async fn open(path: impl Into<PathBuf>) -> DbResult<Database> {
        let path = path.into();
        debug!(target: LOG_TARGET, path = %path.display(), "Opening database");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context(DataDirSnafu)?;
        }

        let inner = tokio::task::spawn_blocking(move || redb_bincode::Database::create(path))
            .await
            .context(JoinSnafu)?
            .context(DatabaseSnafu)?;

        Self::write_with_inner(&inner, |tx| {
            Self::init_tables_tx(tx)?;
            Self::handle_db_ver_tx(&mut tx.open_table(&db_version::TABLE)?)?;
            Ok(())
        })
        .await?;

        Ok(Self { inner })
    }

    fn init_tables_tx(tx: &WriteTransaction) -> DbResult<()> {
        tx.open_table(&db_version::TABLE)?;
        tx.open_table(&id_sequences::TABLE)?;
        tx.open_table(&tables::users::TABLE)?;
        tx.open_table(&users_by_name::TABLE)?;
        tx.open_table(&tables::feeds::TABLE)?;
        tx.open_table(&feeds_by_url::TABLE)?;
        tx.open_table(&feed_follows::TABLE)?;
        tx.open_table(&tables::posts::TABLE)?;
        tx.open_table(&posts_by_link::TABLE)?;
        Ok(())
    }

    fn handle_db_ver_tx(db_version_table: &mut db_version::Table) -> DbResult<()> {
        let Some(db_ver) = db_version_table.get(&())?.map(|g| g.value()) else {
            info!(target: LOG_TARGET, "Initializing new database");
            db_version_table.insert(&(), &DB_VERSION)?;
            return Ok(());
        };

        if DB_VERSION < db_ver {
            return DbVersionTooHighSnafu {
                db_ver,
                code_ver: DB_VERSION,
            }
            .fail();
        }

        debug!(target: LOG_TARGET, db_ver, "Database version ok");
        Ok(())
    }

    pub(crate) fn next_id_tx(
        seq: IdSequence,
        id_sequences_table: &mut id_sequences::Table,
    ) -> DbResult<u64> {
        let last = id_sequences_table
            .get(&seq)?
            .map(|g| g.value())
            .unwrap_or_default();
        let next = last.checked_add(1).ok_or(DbError::Overflow)?;
        id_sequences_table.insert(&seq, &next)?;
        Ok(next)
    }

    pub async fn write_with_inner<T>(
        inner: &redb_bincode::Database,
        f: impl FnOnce(&'_ WriteTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = inner.begin_write().context(TransactionSnafu)?;
            let res = f(&dbtx)?;

            dbtx.commit().context(CommitSnafu)?;

            Ok(res)
        })
    }

    pub async fn write_with<T>(
        &self,
        f: impl FnOnce(&'_ WriteTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        Self::write_with_inner(&self.inner, f).await
    }

    pub async fn read_with_inner<T>(
        inner: &redb_bincode::Database,
        f: impl FnOnce(&'_ ReadTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = inner.begin_read().context(TransactionSnafu)?;

            f(&dbtx)
        })
    }

    pub async fn read_with<T>(
        &self,
        f: impl FnOnce(&'_ ReadTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        Self::read_with_inner(&self.inner, f).await
    }

    /// Remove every user, feed, follow and post
    ///
    /// Id sequences are kept, so ids are never reused.
    pub async fn reset(&self) -> DbResult<()> {
        macro_rules! clear_table {
            ($tx:expr, $t:ident) => {{
                let mut table = $tx.open_table(&tables::$t::TABLE)?;
                let keys = table
                    .range::<tables::$t::Key>(..)?
                    .map(|res| res.map(|(k, _)| k.value()))
                    .collect::<result::Result<Vec<_>, _>>()?;
                for key in &keys {
                    table.remove(key)?;
                }
                keys.len()
            }};
        }

        self.write_with(|tx| {
            let users_removed = clear_table!(tx, users);
            clear_table!(tx, users_by_name);
            let feeds_removed = clear_table!(tx, feeds);
            clear_table!(tx, feeds_by_url);
            clear_table!(tx, feed_follows);
            let posts_removed = clear_table!(tx, posts);
            clear_table!(tx, posts_by_link);

            info!(
                target: LOG_TARGET,
                users_removed, feeds_removed, posts_removed, "Database reset"
            );
            Ok(())
        })
        .await
    }
}
