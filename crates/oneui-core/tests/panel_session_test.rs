#![allow(clippy::unwrap_used)]
// End-to-end tests: `KeySession` driving a real `PanelClient` against wiremock.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oneui_core::{
    CoreError, DragState, KeySession, PanelConfig, RelationId, SessionConfig, TlsVerification,
    connect,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Arc<oneui_api::PanelClient>) {
    let server = MockServer::start().await;
    let config = PanelConfig {
        url: Url::parse(&server.uri()).unwrap(),
        token: SecretString::from("test-token".to_owned()),
        tls: TlsVerification::SystemDefaults,
        timeout: Duration::from_secs(5),
    };
    let client = connect(&config).unwrap();
    (server, Arc::new(client))
}

async fn mount_user(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/users/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "id": "42",
                "username": "mya-01",
                "inbounds": [
                    { "id": 1, "inboundId": 10, "enabled": true, "priority": 100,
                      "inbound": { "id": 10, "protocol": "vmess", "port": 8080,
                                   "network": "tcp", "security": "none", "tag": "vm-tcp" } },
                    { "id": 2, "inboundId": 20, "enabled": true, "priority": 101,
                      "inbound": { "id": 20, "protocol": "vless", "port": 443,
                                   "network": "ws", "security": "tls", "remark": "SG WS" } }
                ]
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/users/42/devices"))
        .and(query_param("windowMinutes", "60"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [
                { "fingerprint": "fp-a", "inboundId": 20, "online": true,
                  "lastSeenAt": "2026-10-16T08:00:00Z", "clientIp": "10.0.0.2" },
                { "fingerprint": "fp-b", "inboundId": 20, "online": false,
                  "lastSeenAt": "2026-10-15T08:00:00Z" }
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/users/online"))
        .and(query_param("userIds", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [ { "userId": "42", "online": true } ]
        })))
        .mount(server)
        .await;
}

// ── Rows ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rows_fuse_telemetry_and_presence() {
    let (server, client) = setup().await;
    mount_user(&server).await;

    let rows = KeySession::oneshot(client, SessionConfig::default(), "42".into(), |s| async move {
        Ok::<_, CoreError>(s.rows())
    })
    .await
    .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].label, "vm-tcp");
    assert!(!rows[0].online, "two keys: no single-key fallback");
    assert_eq!(rows[1].label, "SG WS");
    assert!(rows[1].online);
    assert_eq!(rows[1].online_devices, 1);
    assert_eq!(rows[1].seen_devices, 2);
}

// ── Drag ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_drop_submits_single_batch() {
    let (server, client) = setup().await;
    mount_user(&server).await;

    Mock::given(method("PUT"))
        .and(path("/api/users/42/inbounds/reorder"))
        .and(body_json(json!({
            "assignments": [
                { "inboundId": 20, "priority": 100, "enabled": true },
                { "inboundId": 10, "priority": 101, "enabled": true }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    KeySession::oneshot(client, SessionConfig::default(), "42".into(), |s| async move {
        s.move_key(RelationId::new(2), RelationId::new(1)).await
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_abandoned_drop_returns_drag_to_idle() {
    let (server, client) = setup().await;
    mount_user(&server).await;

    Mock::given(method("PUT"))
        .and(path("/api/users/42/inbounds/reorder"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/users/42/inbounds/reorder-pattern"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "totalKeys": 2, "matchedKeys": 1, "changedKeys": 2 }
        })))
        .mount(&server)
        .await;

    KeySession::oneshot(client, SessionConfig::default(), "42".into(), |s| async move {
        s.drag_begin(RelationId::new(2)).await?;
        let dropped =
            tokio::time::timeout(Duration::from_millis(200), s.drag_drop(RelationId::new(1))).await;
        assert!(dropped.is_err(), "the slow batch should still be pending");

        assert_eq!(s.drag_state(), DragState::Idle);
        assert!(s.reorder_in_flight().is_none());
        s.preview_pattern("myanmar").await?;
        s.drag_begin(RelationId::new(1)).await
    })
    .await
    .unwrap();
}

// ── Reorder workflows ───────────────────────────────────────────────

#[tokio::test]
async fn test_pattern_without_matches_is_refused() {
    let (server, client) = setup().await;
    mount_user(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/users/42/inbounds/reorder-pattern"))
        .and(body_json(json!({ "pattern": "myanmar", "dryRun": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "totalKeys": 2, "matchedKeys": 0, "changedKeys": 0 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = KeySession::oneshot(client, SessionConfig::default(), "42".into(), |s| async move {
        s.preview_pattern("Myanmar").await
    })
    .await
    .unwrap_err();

    assert!(matches!(err, CoreError::NoPatternMatch { .. }));
}

#[tokio::test]
async fn test_abandoned_confirm_keeps_the_preview() {
    let (server, client) = setup().await;
    mount_user(&server).await;

    let result = json!({
        "success": true,
        "data": { "totalKeys": 2, "matchedKeys": 1, "changedKeys": 2 }
    });
    Mock::given(method("POST"))
        .and(path("/api/users/42/inbounds/reorder-pattern"))
        .and(body_json(json!({ "pattern": "myanmar", "dryRun": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(result.clone()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/users/42/inbounds/reorder-pattern"))
        .and(body_json(json!({ "pattern": "myanmar", "dryRun": false })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(result)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    KeySession::oneshot(client, SessionConfig::default(), "42".into(), |s| async move {
        let preview = s.preview_pattern("myanmar").await?;
        let confirmed =
            tokio::time::timeout(Duration::from_millis(200), s.confirm_reorder()).await;
        assert!(confirmed.is_err(), "the slow apply should still be pending");

        assert_eq!(s.active_preview().await, Some(preview));
        assert!(s.reorder_in_flight().is_none());
        assert!(s.cancel_reorder().await);
        Ok::<_, CoreError>(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_quality_preview_carries_scores() {
    let (server, client) = setup().await;
    mount_user(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/users/42/inbounds/reorder-quality"))
        .and(body_json(json!({ "windowMinutes": 30, "dryRun": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "totalKeys": 2, "scoredKeys": 1, "changedKeys": 2, "windowMinutes": 30,
                "currentTop3": [ { "inboundId": 10, "key": "vm-tcp", "priority": 100 } ],
                "newTop3": [ { "inboundId": 20, "key": "SG WS", "priority": 100 } ],
                "scores": [ { "inboundId": 20, "key": "SG WS", "score": 12.5,
                              "connectSuccesses": 14, "limitRejects": 1, "reconnects": 0,
                              "toPriority": 100 } ]
            }
        })))
        .mount(&server)
        .await;

    let preview = KeySession::oneshot(client, SessionConfig::default(), "42".into(), |s| async move {
        s.preview_quality(Some(30)).await
    })
    .await
    .unwrap();

    assert_eq!(preview.eligible_keys, 1);
    assert_eq!(preview.new_top3[0].key, "SG WS");
    let oneui_core::PreviewDetail::Quality { scores, .. } = preview.detail else {
        panic!("expected quality detail");
    };
    assert_eq!(scores[0].connect_successes, 14);
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_user_is_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/users/404"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": "user not found" })),
        )
        .mount(&server)
        .await;

    let err = KeySession::oneshot(client, SessionConfig::default(), "404".into(), |s| async move {
        Ok::<_, CoreError>(s.rows())
    })
    .await
    .unwrap_err();

    assert!(matches!(err, CoreError::UserNotFound { .. }));
}
