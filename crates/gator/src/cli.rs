use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gator_agg::Cadence;

/// gator - a personal feed aggregator
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub cmd: OptsCmd,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file [default: ~/.gatorconfig.json]
    #[arg(env = "GATOR_CONFIG", long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum OptsCmd {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// Delete all users, feeds, follows and posts
    Reset,
    /// List users
    Users,
    /// Fetch feeds periodically, until interrupted
    Agg(AggOpts),
    /// Add a feed, and follow it as the current user
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow an already added feed
    Follow { url: String },
    /// List feeds followed by the current user
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the newest posts of followed feeds
    Browse {
        #[arg(default_value_t = 2)]
        limit: usize,
    },
}

#[derive(Debug, Args)]
pub struct AggOpts {
    /// Time between two fetches, e.g. `30s`, `1m` or `1h30m`
    pub cadence: Cadence,

    /// Skip entries with an unrecognized publication date, instead of
    /// abandoning the rest of the feed until its next turn
    #[arg(long)]
    pub skip_invalid_dates: bool,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn parses_agg_options() {
        let opts = Opts::try_parse_from(["gator", "agg", "1m30s", "--skip-invalid-dates"]).unwrap();

        let OptsCmd::Agg(agg) = opts.cmd else {
            panic!("expected agg");
        };
        assert_eq!(agg.cadence.as_duration(), Duration::from_secs(90));
        assert!(agg.skip_invalid_dates);
    }

    #[test]
    fn rejects_invalid_cadence() {
        assert!(Opts::try_parse_from(["gator", "agg", "0s"]).is_err());
        assert!(Opts::try_parse_from(["gator", "agg", "soon"]).is_err());
    }

    #[test]
    fn browse_defaults_to_two_posts() {
        let opts = Opts::try_parse_from(["gator", "browse"]).unwrap();
        assert!(matches!(opts.cmd, OptsCmd::Browse { limit: 2 }));

        let opts = Opts::try_parse_from(["gator", "--config", "/tmp/c.json", "browse", "10"]).unwrap();
        assert!(matches!(opts.cmd, OptsCmd::Browse { limit: 10 }));
        assert_eq!(opts.global.config, Some(PathBuf::from("/tmp/c.json")));
    }

    #[test]
    fn addfeed_takes_name_and_url() {
        let opts =
            Opts::try_parse_from(["gator", "addfeed", "Blog", "https://blog.example.com/rss"]).unwrap();

        let OptsCmd::AddFeed { name, url } = opts.cmd else {
            panic!("expected addfeed");
        };
        assert_eq!(name, "Blog");
        assert_eq!(url, "https://blog.example.com/rss");
    }
}
