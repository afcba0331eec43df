use std::fmt;
use std::path::PathBuf;

use snafu::{ResultExt as _, Snafu};
use url::Url;

use crate::cli::{EmbedStyle, PostStyle, RunOpts};

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Missing required configuration value: {name}"))]
    Missing { name: &'static str },
    #[snafu(display("Invalid {name} URL {value:?}: {source}"))]
    InvalidUrl {
        name: &'static str,
        value: String,
        source: url::ParseError,
    },
    #[snafu(display("max-entries-per-run must be at least 1"))]
    ZeroBatch,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-cycle knobs, independent of where entries come from or go to.
#[derive(Debug, Clone, Copy)]
pub struct CycleOptions {
    pub max_entries_per_run: usize,
    pub post_style: PostStyle,
    pub embed: EmbedStyle,
    pub dry_run: bool,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            max_entries_per_run: 5,
            post_style: PostStyle::DescriptionKey,
            embed: EmbedStyle::Images,
            dry_run: false,
        }
    }
}

/// Validated bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub feed_url: Url,
    pub service: Url,
    /// `None` only in dry-run mode, which never logs in.
    pub credentials: Option<Credentials>,
    pub checkpoint_path: PathBuf,
    pub cycle: CycleOptions,
}

impl BotConfig {
    pub fn from_opts(opts: &RunOpts) -> ConfigResult<Self> {
        let feed_url = require("RSS_URL", opts.rss_url.as_deref())?;
        let feed_url = Url::parse(feed_url).context(InvalidUrlSnafu {
            name: "RSS_URL",
            value: feed_url,
        })?;
        let service = Url::parse(&opts.service).context(InvalidUrlSnafu {
            name: "BLUESKY_SERVICE",
            value: &opts.service,
        })?;

        let credentials = if opts.dry_run {
            None
        } else {
            Some(Credentials {
                identifier: require("BLUESKY_IDENTIFIER", opts.identifier.as_deref())?.to_owned(),
                password: require("BLUESKY_PASSWORD", opts.password.as_deref())?.to_owned(),
            })
        };

        if opts.max_entries_per_run == 0 {
            return ZeroBatchSnafu.fail();
        }

        Ok(Self {
            feed_url,
            service,
            credentials,
            checkpoint_path: opts.timestamp_file.clone(),
            cycle: CycleOptions {
                max_entries_per_run: opts.max_entries_per_run,
                post_style: opts.post_style,
                embed: opts.embed,
                dry_run: opts.dry_run,
            },
        })
    }
}

/// Blank values count as missing.
pub fn require<'v>(name: &'static str, value: Option<&'v str>) -> ConfigResult<&'v str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => MissingSnafu { name }.fail(),
    }
}
