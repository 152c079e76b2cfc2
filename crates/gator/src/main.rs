mod cli;
mod config;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use gator_agg::{EntryDatePolicy, HttpFetcher, Scheduler, SchedulerConfig};
use gator_db::{Database, DbError, NewFeed, UserRecord};
use gator_util_error::{BoxedError, BoxedErrorExt};
use snafu::{OptionExt as _, ResultExt as _, Snafu};
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{AggOpts, Opts, OptsCmd};
use crate::config::{Config, ConfigError, default_config_path};

pub const LOG_TARGET: &str = "gator::cli";

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Failed to initialize logging"))]
    Logging,
    #[snafu(transparent)]
    Config { source: ConfigError },
    #[snafu(display("Database error"))]
    Database { source: DbError },
    #[snafu(display("No current user; register or log in first"))]
    NotLoggedIn,
    #[snafu(display("User {name} does not exist"))]
    UnknownUser { name: String },
    #[snafu(display("No feed with url {url}; add it with `addfeed` first"))]
    UnknownFeed { url: String },
    #[snafu(display("Miscellaneous error"))]
    Other { source: BoxedError },
}

pub type CliResult<T> = std::result::Result<T, CliError>;

#[snafu::report]
#[tokio::main]
async fn main() -> CliResult<()> {
    init_logging()?;

    let opts = Opts::parse();
    handle_cmd(opts).await
}

/// The configuration file in use, with what it holds
struct Session {
    config_path: PathBuf,
    config: Config,
    db: Arc<Database>,
}

impl Session {
    async fn open(config_path: Option<PathBuf>) -> CliResult<Self> {
        let config_path = match config_path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let config = Config::load(&config_path).await?;
        let db_path = config.db_path()?;

        info!(
            target: LOG_TARGET,
            config = %config_path.display(),
            db = %db_path.display(),
            "Opening database"
        );
        let db = Database::open(db_path).await.context(DatabaseSnafu)?;

        Ok(Self {
            config_path,
            config,
            db: Arc::new(db),
        })
    }

    async fn set_current_user(&mut self, name: &str) -> CliResult<()> {
        self.config.current_user_name = Some(name.to_owned());
        self.config.save(&self.config_path).await?;
        Ok(())
    }

    /// The user commands act on behalf of
    async fn current_user(&self) -> CliResult<UserRecord> {
        let name = self
            .config
            .current_user_name
            .as_deref()
            .context(NotLoggedInSnafu)?;

        self.db
            .get_user_by_name(name)
            .await
            .context(DatabaseSnafu)?
            .context(UnknownUserSnafu { name })
    }
}

async fn handle_cmd(opts: Opts) -> CliResult<()> {
    let mut session = Session::open(opts.global.config).await?;

    match opts.cmd {
        OptsCmd::Register { name } => {
            let user = session.db.create_user(&name).await.context(DatabaseSnafu)?;
            session.set_current_user(&user.name).await?;
            println!("Registered user {} (id {})", user.name, user.id);
        }
        OptsCmd::Login { name } => {
            let user = session
                .db
                .get_user_by_name(&name)
                .await
                .context(DatabaseSnafu)?
                .context(UnknownUserSnafu { name: &name })?;
            session.set_current_user(&user.name).await?;
            println!("Logged in as {}", user.name);
        }
        OptsCmd::Reset => {
            session.db.reset().await.context(DatabaseSnafu)?;
            println!("Removed all users, feeds, follows and posts");
        }
        OptsCmd::Users => {
            let current = session.config.current_user_name.as_deref();
            for user in session.db.list_users().await.context(DatabaseSnafu)? {
                if Some(user.name.as_str()) == current {
                    println!("* {} (current)", user.name);
                } else {
                    println!("* {}", user.name);
                }
            }
        }
        OptsCmd::Agg(agg_opts) => {
            run_agg(&session, agg_opts).await?;
        }
        OptsCmd::AddFeed { name, url } => {
            let user = session.current_user().await?;
            let feed = session
                .db
                .create_feed(NewFeed {
                    name,
                    url,
                    user_id: user.id,
                })
                .await
                .context(DatabaseSnafu)?;
            session
                .db
                .create_feed_follow(user.id, feed.id)
                .await
                .context(DatabaseSnafu)?;

            println!("Added feed {} (id {})", feed.name, feed.id);
            println!("  url:        {}", feed.url);
            println!("  created at: {}", feed.created_at);
            println!("{} now follows {}", user.name, feed.name);
        }
        OptsCmd::Feeds => {
            for feed in session.db.list_feeds().await.context(DatabaseSnafu)? {
                let owner = session
                    .db
                    .get_user(feed.user_id)
                    .await
                    .context(DatabaseSnafu)?
                    .map(|u| u.name)
                    .unwrap_or_else(|| "?".to_owned());
                let last_fetched = feed
                    .last_fetched
                    .map(|ts| ts.to_string())
                    .unwrap_or_else(|| "never".to_owned());

                println!("* {} <{}>", feed.name, feed.url);
                println!("  added by {owner}, last fetched {last_fetched}");
            }
        }
        OptsCmd::Follow { url } => {
            let user = session.current_user().await?;
            let feed = session
                .db
                .get_feed_by_url(&url)
                .await
                .context(DatabaseSnafu)?
                .context(UnknownFeedSnafu { url: &url })?;
            let follow = session
                .db
                .create_feed_follow(user.id, feed.id)
                .await
                .context(DatabaseSnafu)?;

            println!("{} now follows {}", follow.user.name, follow.feed.name);
        }
        OptsCmd::Following => {
            let user = session.current_user().await?;
            for feed in session
                .db
                .list_feed_follows_for_user(user.id)
                .await
                .context(DatabaseSnafu)?
            {
                println!("* {} <{}>", feed.name, feed.url);
            }
        }
        OptsCmd::Unfollow { url } => {
            let user = session.current_user().await?;
            session
                .db
                .delete_feed_follow_by_url(user.id, &url)
                .await
                .context(DatabaseSnafu)?;
            println!("{} no longer follows {url}", user.name);
        }
        OptsCmd::Browse { limit } => {
            let user = session.current_user().await?;
            let posts = session
                .db
                .list_posts_for_user(user.id, limit)
                .await
                .context(DatabaseSnafu)?;

            if posts.is_empty() {
                println!("No posts yet");
            }
            for post in posts {
                println!("{} | {}", post.published_at, post.title);
                println!("  {}", post.link);
                if let Some(description) = &post.description {
                    println!("  {description}");
                }
                println!();
            }
        }
    }

    Ok(())
}

async fn run_agg(session: &Session, opts: AggOpts) -> CliResult<()> {
    let fetcher = BoxedErrorExt::boxed(HttpFetcher::new()).context(OtherSnafu)?;
    let config = SchedulerConfig {
        cadence: opts.cadence,
        entry_date_policy: if opts.skip_invalid_dates {
            EntryDatePolicy::SkipEntry
        } else {
            EntryDatePolicy::AbortCycle
        },
    };

    println!("Collecting feeds every {}", config.cadence);
    let scheduler = Scheduler::new(session.db.clone(), Box::new(fetcher), config);
    scheduler.run(shutdown_signal()).await;

    Ok(())
}

pub fn init_logging() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| CliError::Logging)?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(target: LOG_TARGET, %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(target: LOG_TARGET, %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
