pub mod bsky;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod feed;
pub mod media;
pub mod preview;
pub mod publisher;

use std::io;

use async_trait::async_trait;
use feedsky_core::compose::{self, POST_MAX_GRAPHEMES};
use feedsky_core::detect::HandleResolver;
use feedsky_core::{ComposeError, ComposeResult, ComposedPost, FeedEntry};
use feedsky_util_error::FmtCompact as _;
use reqwest::Client;
use snafu::{ResultExt as _, Snafu};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::bsky::{AuthError, AuthResult, BskySession};
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::cli::PostStyle;
use crate::config::{ConfigError, Credentials, CycleOptions};
use crate::feed::{FeedError, FeedFetcher};
use crate::media::PreviewImage;
use crate::preview::PreviewResolver;
use crate::publisher::{
    BlobRef, CardFallback, CidLink, PostConfirmation, PostRecord, Publisher, PublisherError,
    PublisherResult, build_record,
};

pub const PROJECT_NAME: &str = "feedsky-bot";
pub const LOG_TARGET: &str = "feedsky_bot::main";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BotError {
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },
    #[snafu(display("Checkpoint error"))]
    Checkpoint { source: CheckpointError },
    #[snafu(display("Feed error"))]
    Feed { source: FeedError },
    #[snafu(display("Authentication error"))]
    Auth { source: AuthError },
    #[snafu(display("Publishing error"))]
    Publish { source: PublisherError },
    #[snafu(display("Failed to build HTTP client"))]
    HttpClient { source: reqwest::Error },
    #[snafu(display("Failed to format post timestamp"))]
    Timestamp { source: time::error::Format },
    #[snafu(display("Logging initialization failed"))]
    Logging,
}

pub type BotResult<T> = std::result::Result<T, BotError>;

/// Opens the API session a cycle posts through.
///
/// Only called once there is something to post.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: Publisher + HandleResolver;

    async fn connect(&self) -> AuthResult<Self::Session>;
}

/// Logs in to a real PDS.
pub struct BskyLogin {
    pub client: Client,
    pub service: Url,
    pub credentials: Credentials,
}

#[async_trait]
impl SessionFactory for BskyLogin {
    type Session = BskySession;

    async fn connect(&self) -> AuthResult<BskySession> {
        BskySession::login(self.client.clone(), &self.service, &self.credentials).await
    }
}

/// Stands in for a session in `--dry-run`: nothing leaves the machine.
pub struct DryRun;

#[async_trait]
impl SessionFactory for DryRun {
    type Session = DryRun;

    async fn connect(&self) -> AuthResult<DryRun> {
        Ok(DryRun)
    }
}

#[async_trait]
impl Publisher for DryRun {
    async fn upload_image(&self, image: &PreviewImage) -> PublisherResult<BlobRef> {
        Ok(BlobRef {
            kind: "blob".into(),
            reference: CidLink {
                link: "dry-run".into(),
            },
            mime_type: image.mime_type.clone(),
            size: image.bytes.len() as u64,
        })
    }

    async fn publish(&self, _record: &PostRecord) -> PublisherResult<PostConfirmation> {
        Ok(PostConfirmation {
            uri: "at://dry-run".into(),
            cid: "dry-run".into(),
        })
    }
}

#[async_trait]
impl HandleResolver for DryRun {
    async fn resolve_handle(&self, _handle: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub published: usize,
    pub skipped: usize,
}

/// Turn an entry into post text according to `style`.
pub async fn compose_entry(
    entry: &FeedEntry,
    style: PostStyle,
    resolver: &dyn HandleResolver,
) -> ComposeResult<ComposedPost> {
    match style {
        PostStyle::DescriptionKey => {
            compose::compose_long_form(
                entry.title_text(),
                entry.description_text(),
                entry.primary_link(),
                resolver,
            )
            .await
        }
        PostStyle::TitleSource => {
            compose::compose_title_with_source(
                entry.title_text(),
                entry.primary_link(),
                POST_MAX_GRAPHEMES,
                resolver,
            )
            .await
        }
    }
}

/// Post everything published since the checkpoint, oldest first.
///
/// The checkpoint is advanced after each entry, so a failed post leaves it at
/// the last entry that went out and the next run retries from there.
pub async fn run_one_cycle<F: SessionFactory>(
    options: &CycleOptions,
    checkpoint: &CheckpointStore,
    fetcher: &dyn FeedFetcher,
    previews: &dyn PreviewResolver,
    sessions: &F,
) -> BotResult<RunSummary> {
    let since = checkpoint.read().await.context(CheckpointSnafu)?;
    info!(target: LOG_TARGET, %since, "Starting cycle");

    let entries = fetcher.fetch(since).await.context(FeedSnafu)?;
    if entries.is_empty() {
        info!(target: LOG_TARGET, "No new entries");
        return Ok(RunSummary::default());
    }
    info!(target: LOG_TARGET, count = entries.len(), "Processing new entries");

    let session = sessions.connect().await.context(AuthSnafu)?;
    let mut summary = RunSummary::default();

    for entry in &entries {
        let processed_at = entry.published_at.unwrap_or_else(OffsetDateTime::now_utc);

        let post = match compose_entry(entry, options.post_style, &session).await {
            Ok(post) => post,
            Err(err @ ComposeError::InvalidLink { .. }) => {
                warn!(
                    target: LOG_TARGET,
                    err = %err.fmt_compact(),
                    title = %entry.title_text(),
                    "Skipping entry"
                );
                summary.skipped += 1;
                advance(options, checkpoint, processed_at).await?;
                continue;
            }
        };
        info!(
            target: LOG_TARGET,
            post = %serde_json::to_string(&post).unwrap_or_default(),
            "Composed post"
        );

        let preview = previews.resolve(&post.source_url).await;
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context(TimestampSnafu)?;
        let record = build_record(
            &session,
            &post,
            &preview,
            options.embed,
            CardFallback {
                title: entry.title_text(),
                description: entry.description_text(),
            },
            created_at,
        )
        .await;
        info!(
            target: LOG_TARGET,
            record = %serde_json::to_string(&record).unwrap_or_default(),
            dry_run = options.dry_run,
            "Publishing post"
        );

        let confirmation = session.publish(&record).await.context(PublishSnafu)?;
        info!(target: LOG_TARGET, uri = %confirmation.uri, cid = %confirmation.cid, "Published post");
        summary.published += 1;

        advance(options, checkpoint, processed_at).await?;
    }

    info!(
        target: LOG_TARGET,
        published = summary.published,
        skipped = summary.skipped,
        "Cycle complete"
    );
    Ok(summary)
}

async fn advance(
    options: &CycleOptions,
    checkpoint: &CheckpointStore,
    ts: OffsetDateTime,
) -> BotResult<()> {
    if options.dry_run {
        return Ok(());
    }
    checkpoint.write(ts).await.context(CheckpointSnafu)
}

pub fn init_logging() -> BotResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| BotError::Logging)?;

    Ok(())
}
