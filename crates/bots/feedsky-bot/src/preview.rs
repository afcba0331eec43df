//! Link previews from Open Graph metadata.

use async_trait::async_trait;
use feedsky_util_error::FmtCompact as _;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use serde::Serialize;
use snafu::{ResultExt as _, Snafu};
use tracing::{debug, info, warn};
use url::Url;

use crate::media::{self, MediaError, PreviewImage};

const LOG_TARGET: &str = "feedsky_bot::preview";

/// Many sites only serve OGP tags to known crawlers.
pub const PREVIEW_USER_AGENT: &str = "Twitterbot";

/// Bluesky accepts at most this many images per post.
pub const MAX_PREVIEW_IMAGES: usize = 4;

#[derive(Debug, Snafu)]
pub enum PreviewError {
    #[snafu(display("Request to {url} failed"))]
    Http { url: Url, source: reqwest::Error },
    #[snafu(display("{url} is not an image (content-type: {content_type:?})"))]
    NotAnImage { url: Url, content_type: String },
    #[snafu(display("Unusable image at {url}"))]
    Media { url: Url, source: MediaError },
}

pub type PreviewResult<T> = std::result::Result<T, PreviewError>;

/// Open Graph values of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OgpMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Image URLs as they appear in the page, possibly relative.
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Preview {
    pub title: Option<String>,
    pub description: Option<String>,
    pub images: Vec<PreviewImage>,
}

#[async_trait]
pub trait PreviewResolver: Send + Sync {
    /// Best effort: every failure just leaves parts of the preview empty.
    async fn resolve(&self, url: &str) -> Preview;
}

pub struct HttpPreviewResolver {
    client: Client,
}

impl HttpPreviewResolver {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder().user_agent(PREVIEW_USER_AGENT).build()?;
        Ok(Self { client })
    }

    async fn fetch_page(&self, url: &Url) -> PreviewResult<String> {
        self.client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context(HttpSnafu { url: url.clone() })?
            .text()
            .await
            .context(HttpSnafu { url: url.clone() })
    }

    async fn fetch_image(&self, url: &Url) -> PreviewResult<PreviewImage> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context(HttpSnafu { url: url.clone() })?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        if !content_type.contains("image") {
            return NotAnImageSnafu {
                url: url.clone(),
                content_type,
            }
            .fail();
        }

        let bytes = response
            .bytes()
            .await
            .context(HttpSnafu { url: url.clone() })?;

        media::normalize_image(&bytes, &content_type).context(MediaSnafu { url: url.clone() })
    }
}

#[async_trait]
impl PreviewResolver for HttpPreviewResolver {
    async fn resolve(&self, url: &str) -> Preview {
        let page_url = match Url::parse(url) {
            Ok(u) => u,
            Err(err) => {
                warn!(target: LOG_TARGET, %url, err = %err, "Can't resolve preview of invalid URL");
                return Preview::default();
            }
        };

        let html = match self.fetch_page(&page_url).await {
            Ok(html) => html,
            Err(err) => {
                warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Failed to fetch preview page");
                return Preview::default();
            }
        };

        let ogp = parse_ogp(&html);
        info!(
            target: LOG_TARGET,
            %url,
            ogp = %serde_json::to_string(&ogp).unwrap_or_default(),
            "Parsed OGP metadata"
        );

        let mut images = Vec::new();
        for candidate in &ogp.images {
            if MAX_PREVIEW_IMAGES <= images.len() {
                debug!(target: LOG_TARGET, %candidate, "Image limit reached, ignoring the rest");
                break;
            }
            let Ok(image_url) = page_url.join(candidate) else {
                debug!(target: LOG_TARGET, %candidate, "Skipping unparsable image URL");
                continue;
            };
            match self.fetch_image(&image_url).await {
                Ok(image) => {
                    debug!(target: LOG_TARGET, url = %image_url, ?image, "Fetched preview image");
                    images.push(image);
                }
                Err(err) => {
                    warn!(target: LOG_TARGET, err = %err.fmt_compact(), "Skipping preview image");
                }
            }
        }

        Preview {
            title: ogp.title,
            description: ogp.description,
            images,
        }
    }
}

/// Extract `og:title`, `og:description` and image URLs from a page.
///
/// `og:image:secure_url` describes the `og:image` before it and replaces its
/// URL rather than adding another image.
pub fn parse_ogp(html: &str) -> OgpMetadata {
    let document = Html::parse_document(html);
    let Ok(meta_selector) = Selector::parse("meta") else {
        return OgpMetadata::default();
    };

    let mut ogp = OgpMetadata::default();
    for element in document.select(&meta_selector) {
        let el = element.value();
        let Some(property) = el.attr("property").or_else(|| el.attr("name")) else {
            continue;
        };
        let Some(content) = el.attr("content").map(str::trim).filter(|c| !c.is_empty()) else {
            continue;
        };

        match property.trim().to_ascii_lowercase().as_str() {
            "og:title" if ogp.title.is_none() => ogp.title = Some(content.to_owned()),
            "og:description" if ogp.description.is_none() => {
                ogp.description = Some(content.to_owned())
            }
            "og:image" | "og:image:url" => ogp.images.push(content.to_owned()),
            "og:image:secure_url" => match ogp.images.last_mut() {
                Some(last) => *last = content.to_owned(),
                None => ogp.images.push(content.to_owned()),
            },
            _ => {}
        }
    }

    let mut seen = std::collections::BTreeSet::new();
    ogp.images.retain(|url| seen.insert(url.clone()));
    ogp
}
