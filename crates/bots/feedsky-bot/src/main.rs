use clap::Parser;
use feedsky_bot::checkpoint::{CheckpointStore, parse_checkpoint};
use feedsky_bot::cli::{Command, DevCommand, Opts, RunOpts};
use feedsky_bot::config::BotConfig;
use feedsky_bot::feed::{FeedFetcher as _, HttpFeedFetcher};
use feedsky_bot::preview::{HttpPreviewResolver, PreviewResolver as _};
use feedsky_bot::{
    BotResult, BskyLogin, CheckpointSnafu, ConfigSnafu, DryRun, FeedSnafu, HttpClientSnafu,
    LOG_TARGET, PROJECT_NAME, init_logging, run_one_cycle,
};
use feedsky_core::compose::{self, SHORT_FORM_TITLE_MAX_GRAPHEMES};
use feedsky_core::detect::NoHandleResolver;
use feedsky_core::{ComposeResult, ComposedPost};
use feedsky_util_error::FmtCompact as _;
use reqwest::Client;
use snafu::ResultExt as _;
use time::OffsetDateTime;
use tracing::info;

#[snafu::report]
#[tokio::main]
async fn main() -> BotResult<()> {
    dotenv::dotenv().ok();
    init_logging()?;

    let opts = Opts::parse();

    match opts.command {
        Some(Command::Dev { dev_command }) => handle_dev_command(dev_command, &opts.run).await,
        None => run_bot(&opts.run).await,
    }
}

async fn run_bot(run: &RunOpts) -> BotResult<()> {
    let config = BotConfig::from_opts(run).context(ConfigSnafu)?;
    info!(
        target: LOG_TARGET,
        feed = %config.feed_url,
        service = %config.service,
        checkpoint = %config.checkpoint_path.display(),
        max_entries = config.cycle.max_entries_per_run,
        post_style = ?config.cycle.post_style,
        embed = ?config.cycle.embed,
        dry_run = config.cycle.dry_run,
        "Starting {PROJECT_NAME}"
    );

    let client = Client::builder().build().context(HttpClientSnafu)?;
    let checkpoint = CheckpointStore::new(&config.checkpoint_path);
    let fetcher = HttpFeedFetcher::new(
        client.clone(),
        config.feed_url.clone(),
        config.cycle.max_entries_per_run,
    );
    let previews = HttpPreviewResolver::new().context(HttpClientSnafu)?;

    let summary = match config.credentials {
        Some(credentials) => {
            let sessions = BskyLogin {
                client,
                service: config.service.clone(),
                credentials,
            };
            run_one_cycle(&config.cycle, &checkpoint, &fetcher, &previews, &sessions).await?
        }
        None => run_one_cycle(&config.cycle, &checkpoint, &fetcher, &previews, &DryRun).await?,
    };

    info!(
        target: LOG_TARGET,
        published = summary.published,
        skipped = summary.skipped,
        "Done"
    );
    Ok(())
}

async fn handle_dev_command(dev_command: DevCommand, run: &RunOpts) -> BotResult<()> {
    match dev_command {
        DevCommand::Compose {
            title,
            description,
            link,
        } => {
            println!("Short form:");
            print_composed(compose::compose_short_form(
                &title,
                &link,
                SHORT_FORM_TITLE_MAX_GRAPHEMES,
            ));
            println!();

            println!("Long form:");
            print_composed(
                compose::compose_long_form(&title, &description, &link, &NoHandleResolver).await,
            );
            println!();

            println!("Title with source:");
            print_composed(
                compose::compose_title_with_source(
                    &title,
                    &link,
                    compose::POST_MAX_GRAPHEMES,
                    &NoHandleResolver,
                )
                .await,
            );
            Ok(())
        }
        DevCommand::Feed { since } => {
            let config = BotConfig::from_opts(&RunOpts {
                dry_run: true,
                ..run.clone()
            })
            .context(ConfigSnafu)?;

            let since = match since {
                Some(raw) => parse_checkpoint(&raw).context(CheckpointSnafu)?,
                None => match CheckpointStore::new(&config.checkpoint_path).read().await {
                    Ok(ts) => ts,
                    Err(err) => {
                        eprintln!("No usable checkpoint ({}), listing all entries", err.fmt_compact());
                        OffsetDateTime::UNIX_EPOCH
                    }
                },
            };

            let client = Client::builder().build().context(HttpClientSnafu)?;
            let fetcher = HttpFeedFetcher::new(
                client,
                config.feed_url.clone(),
                config.cycle.max_entries_per_run,
            );
            let entries = fetcher.fetch(since).await.context(FeedSnafu)?;

            println!("{} entries after {since}:", entries.len());
            println!();
            for (i, entry) in entries.iter().enumerate() {
                println!("Entry {}:", i + 1);
                println!("  Title: {}", entry.title_text());
                println!("  Link: {}", entry.primary_link());
                println!("  Published: {:?}", entry.published_at);
                println!("  Description: {}", entry.description_text());
                println!();
            }
            Ok(())
        }
        DevCommand::Preview { url } => {
            let previews = HttpPreviewResolver::new().context(HttpClientSnafu)?;

            let preview = previews.resolve(&url).await;
            println!("Title: {}", preview.title.as_deref().unwrap_or("None"));
            println!(
                "Description: {}",
                preview.description.as_deref().unwrap_or("None")
            );
            println!("Images: {}", preview.images.len());
            for (i, image) in preview.images.iter().enumerate() {
                println!(
                    "  Image {}: {} ({} bytes)",
                    i + 1,
                    image.mime_type,
                    image.bytes.len()
                );
            }
            Ok(())
        }
    }
}

fn print_composed(res: ComposeResult<ComposedPost>) {
    match res {
        Ok(post) => {
            println!("{}", post.text);
            println!("---");
            for facet in &post.facets {
                println!(
                    "  {}..{} {:?} {:?}",
                    facet.index.byte_start,
                    facet.index.byte_end,
                    facet.slice(&post.text).unwrap_or_default(),
                    facet.features
                );
            }
        }
        Err(err) => println!("Error: {}", err.fmt_compact()),
    }
}
