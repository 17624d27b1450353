//! The default HTTP transport against a fake node served by axum

mod common;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use common::node_info;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use trinity_client::block::BlockId;
use trinity_client::config::NodeAuth;
use trinity_client::{Client, Error};

const TOKEN: &str = "node-token";

async fn spawn_node(healthy: bool) -> SocketAddr {
    let info = node_info();
    let app = Router::new()
        .route(
            "/health",
            get(move || async move {
                if healthy {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }),
        )
        .route(
            "/api/core/v2/info",
            get(move || {
                let info = info.clone();
                async move { Json(info) }
            }),
        )
        .route(
            "/api/core/v2/tips",
            get(|| async { Json(json!({"tips": [BlockId([9; 32])]})) }),
        )
        .route(
            "/api/core/v2/peers",
            get(|headers: HeaderMap| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map_or(false, |v| v == format!("Bearer {}", TOKEN));
                if authorized {
                    (StatusCode::OK, Json(json!([])))
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})))
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_http_round_trip() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let addr = spawn_node(true).await;
        let url = format!("http://{}", addr);
        let client = Client::builder()
            .with_node(&url)
            .with_node_sync_disabled()
            .finish()
            .await
            .unwrap();

        assert_eq!(client.get_tips().await.unwrap(), vec![BlockId([9; 32])]);
        assert!(client.get_health(&url).await.unwrap());
        assert_eq!(client.get_bech32_hrp(), common::HRP);

        // no credentials configured for this node
        let err = client.get_peers().await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }), "unexpected error {:?}", err);
    })
    .await
    .expect("test_http_round_trip timed out");
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let addr = spawn_node(true).await;
        let client = Client::builder()
            .with_node_auth(
                &format!("http://{}", addr),
                NodeAuth {
                    jwt: Some(TOKEN.into()),
                    basic_auth_name_pwd: None,
                },
            )
            .with_node_sync_disabled()
            .finish()
            .await
            .unwrap();

        assert!(client.get_peers().await.unwrap().is_empty());
    })
    .await
    .expect("test_bearer_token_is_sent timed out");
}

#[tokio::test]
async fn test_unhealthy_node_reports_false() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let addr = spawn_node(false).await;
        let client = Client::builder().with_offline_mode().finish().await.unwrap();
        // offline clients refuse even direct node queries
        assert!(client.get_health(&format!("http://{}", addr)).await.is_err());

        let online = Client::builder()
            .with_node(&format!("http://{}", addr))
            .with_node_sync_disabled()
            .finish()
            .await
            .unwrap();
        assert!(!online.get_health(&format!("http://{}", addr)).await.unwrap());
    })
    .await
    .expect("test_unhealthy_node_reports_false timed out");
}
