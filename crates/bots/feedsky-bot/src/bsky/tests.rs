use serde_json::json;
use wiremock::matchers::{body_bytes, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::publisher::{Embed, PublisherError};

fn credentials() -> Credentials {
    Credentials {
        identifier: "bot.example.com".into(),
        password: "app-password".into(),
    }
}

async fn logged_in(server: &MockServer) -> BskySession {
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .and(body_json(json!({
            "identifier": "bot.example.com",
            "password": "app-password"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessJwt": "access-token",
            "refreshJwt": "refresh-token",
            "did": "did:plc:bot",
            "handle": "bot.example.com"
        })))
        .expect(1)
        .mount(server)
        .await;

    let service = Url::parse(&server.uri()).unwrap();
    BskySession::login(Client::new(), &service, &credentials())
        .await
        .unwrap()
}

#[test_log::test(tokio::test)]
async fn login_keeps_session_identity() {
    let server = MockServer::start().await;
    let session = logged_in(&server).await;

    assert_eq!(session.did(), "did:plc:bot");
    assert_eq!(session.handle(), "bot.example.com");
}

#[test_log::test(tokio::test)]
async fn login_rejection_carries_xrpc_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "AuthenticationRequired",
            "message": "Invalid identifier or password"
        })))
        .mount(&server)
        .await;

    let service = Url::parse(&server.uri()).unwrap();
    let err = BskySession::login(Client::new(), &service, &credentials())
        .await
        .err()
        .unwrap();

    let rendered = err.fmt_compact().to_string();
    assert!(rendered.starts_with("Failed to log in as bot.example.com"), "{rendered}");
    assert!(rendered.contains("Invalid identifier or password"), "{rendered}");
    assert!(matches!(
        err.source,
        XrpcError::Status {
            status: StatusCode::UNAUTHORIZED,
            ..
        }
    ));
}

#[test_log::test(tokio::test)]
async fn upload_sends_raw_bytes_with_bearer_token() {
    let server = MockServer::start().await;
    let session = logged_in(&server).await;

    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.uploadBlob"))
        .and(header("authorization", "Bearer access-token"))
        .and(header("content-type", "image/jpeg"))
        .and(body_bytes(vec![1, 2, 3]))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "blob": {
                "$type": "blob",
                "ref": { "$link": "bafkreiblob" },
                "mimeType": "image/jpeg",
                "size": 3
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let blob = session
        .upload_image(&PreviewImage {
            bytes: vec![1, 2, 3],
            mime_type: "image/jpeg".into(),
        })
        .await
        .unwrap();
    assert_eq!(blob.reference.link, "bafkreiblob");
    assert_eq!(blob.size, 3);
}

#[test_log::test(tokio::test)]
async fn upload_failure_is_an_upload_error() {
    let server = MockServer::start().await;
    let session = logged_in(&server).await;

    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.uploadBlob"))
        .respond_with(ResponseTemplate::new(413))
        .mount(&server)
        .await;

    let res = session
        .upload_image(&PreviewImage {
            bytes: vec![0; 16],
            mime_type: "image/png".into(),
        })
        .await;
    assert!(matches!(
        res,
        Err(PublisherError::Upload {
            source: XrpcError::Status {
                status: StatusCode::PAYLOAD_TOO_LARGE,
                error: None,
                ..
            }
        })
    ));
}

#[test_log::test(tokio::test)]
async fn publish_creates_record_in_own_repo() {
    let server = MockServer::start().await;
    let session = logged_in(&server).await;

    let record = PostRecord {
        kind: POST_COLLECTION.into(),
        text: "hello".into(),
        facets: vec![],
        embed: None::<Embed>,
        created_at: "2024-01-02T03:04:05Z".into(),
    };

    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.createRecord"))
        .and(header("authorization", "Bearer access-token"))
        .and(body_json(json!({
            "repo": "did:plc:bot",
            "collection": "app.bsky.feed.post",
            "record": {
                "$type": "app.bsky.feed.post",
                "text": "hello",
                "createdAt": "2024-01-02T03:04:05Z"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uri": "at://did:plc:bot/app.bsky.feed.post/3k",
            "cid": "bafyreipost"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let confirmation = session.publish(&record).await.unwrap();
    assert_eq!(confirmation.uri, "at://did:plc:bot/app.bsky.feed.post/3k");
    assert_eq!(confirmation.cid, "bafyreipost");
}

#[test_log::test(tokio::test)]
async fn publish_rejection_is_a_post_error() {
    let server = MockServer::start().await;
    let session = logged_in(&server).await;

    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.createRecord"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "InvalidRequest",
            "message": "Record/text must not be longer than 300 graphemes"
        })))
        .mount(&server)
        .await;

    let record = PostRecord {
        kind: POST_COLLECTION.into(),
        text: "too long".into(),
        facets: vec![],
        embed: None,
        created_at: "2024-01-02T03:04:05Z".into(),
    };
    let err = session.publish(&record).await.err().unwrap();
    assert!(matches!(
        &err,
        PublisherError::Post {
            source: XrpcError::Status { error: Some(e), .. }
        } if e == "InvalidRequest"
    ));
}

#[test_log::test(tokio::test)]
async fn resolves_known_handles_only() {
    let server = MockServer::start().await;
    let session = logged_in(&server).await;

    Mock::given(method("GET"))
        .and(path("/xrpc/com.atproto.identity.resolveHandle"))
        .and(query_param("handle", "alice.example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "did": "did:plc:alice" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/xrpc/com.atproto.identity.resolveHandle"))
        .and(query_param("handle", "nobody.example.com"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "InvalidRequest",
            "message": "Unable to resolve handle"
        })))
        .mount(&server)
        .await;

    assert_eq!(
        session.resolve_handle("alice.example.com").await.as_deref(),
        Some("did:plc:alice")
    );
    assert_eq!(session.resolve_handle("nobody.example.com").await, None);
}

#[test]
fn xrpc_url_ignores_trailing_slash() {
    let service = Url::parse("https://bsky.social").unwrap();
    assert_eq!(
        xrpc_url(&service, "com.atproto.server.createSession"),
        "https://bsky.social/xrpc/com.atproto.server.createSession"
    );
}
