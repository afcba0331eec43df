//! Minimal AT Protocol XRPC client: just what posting needs.

use async_trait::async_trait;
use feedsky_core::detect::HandleResolver;
use feedsky_util_error::FmtCompact as _;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu};
use tracing::{debug, info};
use url::Url;

use crate::config::Credentials;
use crate::media::PreviewImage;
use crate::publisher::{
    BlobRef, POST_COLLECTION, PostConfirmation, PostRecord, PostSnafu, Publisher,
    PublisherResult, UploadSnafu,
};

const LOG_TARGET: &str = "feedsky_bot::bsky";

pub const DEFAULT_SERVICE: &str = "https://bsky.social";

#[derive(Debug, Snafu)]
pub enum XrpcError {
    #[snafu(display("{nsid} request failed"))]
    Http {
        nsid: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display(
        "{nsid} returned {status}: {}",
        message.as_deref().or(error.as_deref()).unwrap_or("no details")
    ))]
    Status {
        nsid: &'static str,
        status: StatusCode,
        error: Option<String>,
        message: Option<String>,
    },
    #[snafu(display("{nsid} returned an unexpected response"))]
    Decode {
        nsid: &'static str,
        source: reqwest::Error,
    },
}

pub type XrpcResult<T> = std::result::Result<T, XrpcError>;

#[derive(Debug, Snafu)]
#[snafu(display("Failed to log in as {identifier}"))]
pub struct AuthError {
    identifier: String,
    source: XrpcError,
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Serialize)]
struct CreateSessionInput<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionOutput {
    access_jwt: String,
    did: String,
    handle: String,
}

#[derive(Deserialize)]
struct UploadBlobOutput {
    blob: BlobRef,
}

#[derive(Serialize)]
struct CreateRecordInput<'a> {
    repo: &'a str,
    collection: &'a str,
    record: &'a PostRecord,
}

#[derive(Deserialize)]
struct ResolveHandleOutput {
    did: String,
}

/// An authenticated session with a PDS.
///
/// Created once per run by [`BskySession::login`] and passed to whatever needs
/// API access.
pub struct BskySession {
    client: Client,
    service: Url,
    did: String,
    handle: String,
    access_jwt: String,
}

impl BskySession {
    pub async fn login(
        client: Client,
        service: &Url,
        credentials: &Credentials,
    ) -> AuthResult<Self> {
        let nsid = "com.atproto.server.createSession";
        let request = client
            .post(xrpc_url(service, nsid))
            .json(&CreateSessionInput {
                identifier: &credentials.identifier,
                password: &credentials.password,
            });
        let session: CreateSessionOutput = send(nsid, request).await.context(AuthSnafu {
            identifier: &credentials.identifier,
        })?;

        info!(target: LOG_TARGET, did = %session.did, handle = %session.handle, "Logged in");

        Ok(Self {
            client,
            service: service.clone(),
            did: session.did,
            handle: session.handle,
            access_jwt: session.access_jwt,
        })
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    fn procedure(&self, nsid: &str) -> RequestBuilder {
        self.client
            .post(xrpc_url(&self.service, nsid))
            .bearer_auth(&self.access_jwt)
    }

    fn query(&self, nsid: &str) -> RequestBuilder {
        self.client
            .get(xrpc_url(&self.service, nsid))
            .bearer_auth(&self.access_jwt)
    }
}

#[async_trait]
impl Publisher for BskySession {
    async fn upload_image(&self, image: &PreviewImage) -> PublisherResult<BlobRef> {
        let nsid = "com.atproto.repo.uploadBlob";
        let request = self
            .procedure(nsid)
            .header(CONTENT_TYPE, &image.mime_type)
            .body(image.bytes.clone());
        let output: UploadBlobOutput = send(nsid, request).await.context(UploadSnafu)?;
        Ok(output.blob)
    }

    async fn publish(&self, record: &PostRecord) -> PublisherResult<PostConfirmation> {
        let nsid = "com.atproto.repo.createRecord";
        let request = self.procedure(nsid).json(&CreateRecordInput {
            repo: &self.did,
            collection: POST_COLLECTION,
            record,
        });
        send(nsid, request).await.context(PostSnafu)
    }
}

#[async_trait]
impl HandleResolver for BskySession {
    async fn resolve_handle(&self, handle: &str) -> Option<String> {
        let nsid = "com.atproto.identity.resolveHandle";
        let request = self.query(nsid).query(&[("handle", handle)]);
        match send::<ResolveHandleOutput>(nsid, request).await {
            Ok(output) => Some(output.did),
            Err(err) => {
                debug!(target: LOG_TARGET, %handle, err = %err.fmt_compact(), "Handle did not resolve");
                None
            }
        }
    }
}

fn xrpc_url(service: &Url, nsid: &str) -> String {
    format!("{}/xrpc/{nsid}", service.as_str().trim_end_matches('/'))
}

async fn send<T: DeserializeOwned>(nsid: &'static str, request: RequestBuilder) -> XrpcResult<T> {
    let response = request.send().await.context(HttpSnafu { nsid })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.json::<XrpcErrorBody>().await.ok();
        let (error, message) = body.map(|b| (b.error, b.message)).unwrap_or_default();
        return StatusSnafu {
            nsid,
            status,
            error,
            message,
        }
        .fail();
    }

    response.json().await.context(DecodeSnafu { nsid })
}

#[cfg(test)]
mod tests;
