//! `app.bsky.feed.post` records and the seam they are published through.

use async_trait::async_trait;
use feedsky_core::{ComposedPost, Facet};
use feedsky_util_error::FmtCompact as _;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use tracing::{info, warn};

use crate::bsky::XrpcError;
use crate::cli::EmbedStyle;
use crate::media::PreviewImage;
use crate::preview::Preview;

const LOG_TARGET: &str = "feedsky_bot::publisher";

pub const POST_COLLECTION: &str = "app.bsky.feed.post";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PublisherError {
    #[snafu(display("Failed to upload image"))]
    Upload { source: XrpcError },
    #[snafu(display("Failed to create post record"))]
    Post { source: XrpcError },
}

pub type PublisherResult<T> = std::result::Result<T, PublisherError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidLink {
    #[serde(rename = "$link")]
    pub link: String,
}

/// Reference to an uploaded blob, as returned by `uploadBlob`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    #[serde(rename = "$type")]
    pub kind: String,
    #[serde(rename = "ref")]
    pub reference: CidLink,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedImage {
    pub image: BlobRef,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalLink {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<BlobRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "$type")]
pub enum Embed {
    #[serde(rename = "app.bsky.embed.images")]
    Images { images: Vec<EmbedImage> },
    #[serde(rename = "app.bsky.embed.external")]
    External { external: ExternalLink },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub kind: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
    /// RFC 3339
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostConfirmation {
    pub uri: String,
    pub cid: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn upload_image(&self, image: &PreviewImage) -> PublisherResult<BlobRef>;
    async fn publish(&self, record: &PostRecord) -> PublisherResult<PostConfirmation>;
}

/// Title and description for an external link card when the page has no OGP.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardFallback<'a> {
    pub title: &'a str,
    pub description: &'a str,
}

/// Upload preview images and assemble the post record.
///
/// Images that fail to upload are dropped; with none left there is no
/// images embed at all. An external card is always attached, with a
/// thumbnail only if one uploaded.
pub async fn build_record(
    publisher: &dyn Publisher,
    post: &ComposedPost,
    preview: &Preview,
    embed_style: EmbedStyle,
    fallback: CardFallback<'_>,
    created_at: String,
) -> PostRecord {
    let max_uploads = match embed_style {
        EmbedStyle::Images => preview.images.len(),
        EmbedStyle::External => 1,
    };

    let mut blobs = Vec::new();
    for image in &preview.images {
        if max_uploads <= blobs.len() {
            break;
        }
        match publisher.upload_image(image).await {
            Ok(blob) => {
                info!(target: LOG_TARGET, cid = %blob.reference.link, mime_type = %blob.mime_type, size = blob.size, "Uploaded image");
                blobs.push(blob);
            }
            Err(err) => {
                warn!(target: LOG_TARGET, err = %err.fmt_compact(), ?image, "Image upload failed, posting without it");
            }
        }
    }

    let embed = match embed_style {
        EmbedStyle::Images if blobs.is_empty() => None,
        EmbedStyle::Images => Some(Embed::Images {
            images: blobs
                .into_iter()
                .map(|image| EmbedImage {
                    image,
                    alt: String::new(),
                })
                .collect(),
        }),
        EmbedStyle::External => Some(Embed::External {
            external: ExternalLink {
                uri: post.source_url.clone(),
                title: preview
                    .title
                    .clone()
                    .unwrap_or_else(|| fallback.title.to_owned()),
                description: preview
                    .description
                    .clone()
                    .unwrap_or_else(|| fallback.description.to_owned()),
                thumb: blobs.into_iter().next(),
            },
        }),
    };

    PostRecord {
        kind: POST_COLLECTION.to_owned(),
        text: post.text.clone(),
        facets: post.facets.clone(),
        embed,
        created_at,
    }
}
