//! Session lifecycle against a mocked identity provider.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_session::store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use oidc_session::{
    AccessToken, Error, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, RefreshToken,
    SessionConfig, SessionManager,
};

const TOKEN_PATH: &str = "/realms/demo/protocol/openid-connect/token";

fn jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

fn config(server: &MockServer) -> SessionConfig {
    SessionConfig::new(server.uri().parse().unwrap(), "demo", "web-ui").unwrap()
}

#[tokio::test]
async fn login_stores_both_tokens_and_exposes_username() {
    let server = MockServer::start().await;
    let access = jwt(&json!({
        "preferred_username": "alice",
        "realm_access": { "roles": ["writer"] },
        "exp": 4_102_444_800u64
    }));

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_id=web-ui"))
        .and(body_string_contains("username=alice"))
        .and(body_string_contains("password=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access,
            "refresh_token": "refresh-1",
            "token_type": "Bearer",
            "expires_in": 300
        })))
        .expect(1)
        .mount(&server)
        .await;

    let persistence = Arc::new(MemoryKeyValueStore::new());
    let session = SessionManager::new(config(&server), persistence.clone());

    let tokens = session.login("alice", "s3cret").await.unwrap();

    assert_eq!(tokens.expires_in, Some(300));
    assert_eq!(session.access_token(), Some(AccessToken(access.clone())));
    assert_eq!(session.refresh_token(), Some(RefreshToken("refresh-1".into())));
    assert_eq!(session.username().as_deref(), Some("alice"));
    assert!(session.roles().contains("writer"));
    assert_eq!(persistence.get(ACCESS_TOKEN_KEY).unwrap(), Some(access));
    assert_eq!(
        persistence.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
        Some("refresh-1")
    );
}

#[tokio::test]
async fn rejected_login_surfaces_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid user credentials"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionManager::new(config(&server), Arc::new(MemoryKeyValueStore::new()));

    let err = session.login("alice", "wrong").await.unwrap_err();

    match err {
        Error::Authentication { status, detail } => {
            assert_eq!(status, 401);
            assert!(detail.contains("invalid_grant"));
        }
        other => panic!("expected Authentication, got {other:?}"),
    }
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn refresh_keeps_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "access-2" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let persistence = Arc::new(MemoryKeyValueStore::with_entries([
        (ACCESS_TOKEN_KEY, "access-1"),
        (REFRESH_TOKEN_KEY, "refresh-1"),
    ]));
    let session = SessionManager::new(config(&server), persistence.clone());

    session.refresh_access_token().await.unwrap();

    assert_eq!(session.access_token(), Some(AccessToken("access-2".into())));
    assert_eq!(session.refresh_token(), Some(RefreshToken("refresh-1".into())));
    assert_eq!(
        persistence.get(ACCESS_TOKEN_KEY).unwrap().as_deref(),
        Some("access-2")
    );
}

#[tokio::test]
async fn refresh_adopts_rotated_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let persistence = Arc::new(MemoryKeyValueStore::with_entries([
        (ACCESS_TOKEN_KEY, "access-1"),
        (REFRESH_TOKEN_KEY, "refresh-1"),
    ]));
    let session = SessionManager::new(config(&server), persistence.clone());

    session.refresh_access_token().await.unwrap();

    assert_eq!(session.refresh_token(), Some(RefreshToken("refresh-2".into())));
    assert_eq!(
        persistence.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
        Some("refresh-2")
    );
}

#[tokio::test]
async fn rejected_refresh_leaves_session_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token is not active"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionManager::new(
        config(&server),
        Arc::new(MemoryKeyValueStore::with_entries([
            (ACCESS_TOKEN_KEY, "access-1"),
            (REFRESH_TOKEN_KEY, "refresh-1"),
        ])),
    );

    let err = session.refresh_access_token().await.unwrap_err();

    assert!(matches!(err, Error::RefreshRejected { status: 400, .. }));
    assert_eq!(session.access_token(), Some(AccessToken("access-1".into())));
    assert_eq!(session.refresh_token(), Some(RefreshToken("refresh-1".into())));
}

#[tokio::test]
async fn session_survives_restart_and_logout_clears_it() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": jwt(&json!({ "preferred_username": "bob" })),
            "refresh_token": "refresh-1"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");

    let first = SessionManager::new(config(&server), Arc::new(FileKeyValueStore::new(&file)));
    first.login("bob", "pw").await.unwrap();
    drop(first);

    let second = SessionManager::new(config(&server), Arc::new(FileKeyValueStore::new(&file)));
    assert!(second.restore());
    assert_eq!(second.username().as_deref(), Some("bob"));

    second.logout();

    assert!(second.access_token().is_none());
    let third = SessionManager::new(config(&server), Arc::new(FileKeyValueStore::new(&file)));
    assert!(!third.restore());
    assert!(third.refresh_token().is_none());
}
