use std::path::PathBuf;

use clap::{Args, Parser};

use crate::bsky::DEFAULT_SERVICE;
use crate::checkpoint::DEFAULT_CHECKPOINT_FILE;

/// Feedsky Bot - posts new RSS/Atom feed entries to Bluesky
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunOpts,
}

#[derive(Debug, Clone, Args)]
pub struct RunOpts {
    /// URL of the RSS/Atom feed to watch
    #[arg(long, env = "RSS_URL")]
    pub rss_url: Option<String>,

    /// Bluesky handle or email to log in with
    #[arg(long, env = "BLUESKY_IDENTIFIER")]
    pub identifier: Option<String>,

    /// Bluesky (app) password
    #[arg(long, env = "BLUESKY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// PDS / entryway to log in to
    #[arg(long, env = "BLUESKY_SERVICE", default_value = DEFAULT_SERVICE)]
    pub service: String,

    /// File holding the timestamp of the last processed entry
    #[arg(long, env = "FEEDSKY_TIMESTAMP_FILE", default_value = DEFAULT_CHECKPOINT_FILE)]
    pub timestamp_file: PathBuf,

    /// Maximum entries to post per run
    #[arg(long, default_value = "5")]
    pub max_entries_per_run: usize,

    /// How to turn an entry into post text
    #[arg(long, value_enum, default_value = "description-key")]
    pub post_style: PostStyle,

    /// How to attach the link preview
    #[arg(long, value_enum, default_value = "images")]
    pub embed: EmbedStyle,

    /// Compose and log posts without logging in, posting or updating the
    /// timestamp file
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PostStyle {
    /// Description followed by a clickable `host/path...` key
    #[value(name = "description-key")]
    DescriptionKey,
    /// Title only, keeping a trailing `(Source: URL)` marker when cut
    #[value(name = "title-source")]
    TitleSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmbedStyle {
    /// Attach preview images directly
    #[value(name = "images")]
    Images,
    /// Attach an external link card, using the first image as thumbnail
    #[value(name = "external")]
    External,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Development commands
    Dev {
        #[command(subcommand)]
        dev_command: DevCommand,
    },
}

#[derive(Debug, Parser)]
pub enum DevCommand {
    /// Print the post texts an entry would produce
    Compose {
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        link: String,
    },
    /// Print the feed entries the next run would process
    Feed {
        /// RFC 3339 timestamp to compare against, instead of the timestamp
        /// file
        #[arg(long)]
        since: Option<String>,
    },
    /// Print the link preview resolved for an URL
    Preview { url: String },
}
