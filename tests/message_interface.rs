//! Envelope-level behavior of the message handler

mod common;

use common::{url, ScriptedTransport, HRP};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use trinity_client::block::BlockId;
use trinity_client::message_interface::MessageHandler;
use trinity_client::node_api::responses::BlockMetadata;
use trinity_client::node_api::routes;
use trinity_client::Client;

async fn send(handler: &MessageHandler, request: Value) -> Value {
    serde_json::from_str(&handler.handle_json(&request.to_string()).await).unwrap()
}

#[tokio::test]
async fn test_offline_network_command_never_reaches_a_node() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let transport = ScriptedTransport::with_healthy_nodes(&["a"]);
        let client = Client::builder()
            .with_node(&url("a"))
            .with_offline_mode()
            .with_transport(transport.clone())
            .finish()
            .await
            .unwrap();
        let handler = MessageHandler::with_client(client);

        let reply = send(&handler, json!({"name": "GetInfo"})).await;
        assert_eq!(reply["type"], "Error");
        assert_eq!(reply["kind"], "state");
        assert!(reply["payload"].as_str().unwrap().contains("offline mode"));

        // offline clients still answer from their configured parameters
        let reply = send(&handler, json!({"name": "GetBech32Hrp"})).await;
        assert_eq!(reply["type"], "Success");

        assert_eq!(transport.calls(), 0);
    })
    .await
    .expect("test_offline_network_command_never_reaches_a_node timed out");
}

#[tokio::test]
async fn test_retry_until_included_gives_up() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let block_id = BlockId([0xab; 32]);
        let transport = ScriptedTransport::with_healthy_nodes(&["a"]);
        transport.reply(
            "a",
            &routes::block_metadata(&block_id),
            &BlockMetadata {
                block_id,
                parents: vec![BlockId([1; 32])],
                is_solid: true,
                referenced_by_milestone_index: None,
                ledger_inclusion_state: None,
                should_promote: Some(false),
                should_reattach: Some(false),
            },
        );
        let client = Client::builder()
            .with_node(&url("a"))
            .with_node_sync_disabled()
            .with_transport(transport)
            .finish()
            .await
            .unwrap();
        let handler = MessageHandler::with_client(client);

        let reply = send(
            &handler,
            json!({
                "name": "RetryUntilIncluded",
                "data": {"blockId": block_id, "interval": 0, "maxAttempts": 1}
            }),
        )
        .await;
        assert_eq!(reply["type"], "Error");
        assert_eq!(reply["kind"], "liveness");
        assert!(reply["payload"].as_str().unwrap().contains(&block_id.to_string()));
    })
    .await
    .expect("test_retry_until_included_gives_up timed out");
}

#[tokio::test]
async fn test_network_parameters_follow_the_nodes() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let transport = ScriptedTransport::with_healthy_nodes(&["a"]);
        let client = Client::builder()
            .with_node(&url("a"))
            .with_node_sync_disabled()
            .with_transport(transport)
            .finish()
            .await
            .unwrap();
        let handler = MessageHandler::with_client(client);

        let reply = send(&handler, json!({"name": "GetBech32Hrp"})).await;
        assert_eq!(reply["payload"], HRP);

        let reply = send(&handler, json!({"name": "GetNetworkId"})).await;
        let network_id = reply["payload"].as_str().unwrap();
        assert!(network_id.parse::<u64>().is_ok());

        let reply = send(&handler, json!({"name": "GetInfo"})).await;
        assert_eq!(reply["type"], "Success");
        assert_eq!(reply["payload"]["nodeInfo"]["protocol"]["networkName"], common::NETWORK_NAME);

        let reply = send(&handler, json!({"name": "UnhealthyNodes"})).await;
        assert_eq!(reply["payload"], json!([]));
    })
    .await
    .expect("test_network_parameters_follow_the_nodes timed out");
}

#[tokio::test]
async fn test_utility_commands() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let client = Client::builder().with_offline_mode().finish().await.unwrap();
        let handler = MessageHandler::with_client(client);

        let reply = send(&handler, json!({"name": "GenerateMnemonic"})).await;
        let mnemonic = reply["payload"].as_str().unwrap().to_string();
        assert_eq!(mnemonic.split_whitespace().count(), 24);

        let reply = send(&handler, json!({"name": "MnemonicToHexSeed", "data": {"mnemonic": mnemonic}})).await;
        assert!(reply["payload"].as_str().unwrap().starts_with("0x"));

        let hex = format!("0x{}", "11".repeat(32));
        let reply = send(&handler, json!({"name": "HexToBech32", "data": {"hex": hex, "bech32Hrp": "tri"}})).await;
        let bech32 = reply["payload"].as_str().unwrap().to_string();
        assert!(bech32.starts_with("tri1"));

        let reply = send(&handler, json!({"name": "Bech32ToHex", "data": {"bech32": bech32}})).await;
        assert_eq!(reply["payload"], hex);

        let reply = send(&handler, json!({"name": "IsAddressValid", "data": {"address": "tri1nope"}})).await;
        assert_eq!(reply["payload"], false);

        let reply = send(&handler, json!({"name": "PostBlockJson", "data": {"block": {"parents": 3}}})).await;
        assert_eq!(reply["type"], "Error");
    })
    .await
    .expect("test_utility_commands timed out");
}

#[tokio::test]
async fn test_tagged_replies_complete_independently() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let block_id = BlockId([0xcd; 32]);
        let transport = ScriptedTransport::with_healthy_nodes(&["a"]);
        transport.reply(
            "a",
            &routes::block_metadata(&block_id),
            &BlockMetadata {
                block_id,
                parents: vec![BlockId([1; 32])],
                is_solid: true,
                referenced_by_milestone_index: None,
                ledger_inclusion_state: None,
                should_promote: Some(false),
                should_reattach: Some(false),
            },
        );
        let client = Client::builder()
            .with_node(&url("a"))
            .with_node_sync_disabled()
            .with_transport(transport)
            .finish()
            .await
            .unwrap();
        let handler = MessageHandler::with_client(client);

        let slow = json!({
            "id": 1,
            "name": "RetryUntilIncluded",
            "data": {"blockId": block_id, "interval": 3, "maxAttempts": 1}
        })
        .to_string();
        let fast = json!({"id": "hrp", "name": "GetBech32Hrp"}).to_string();

        let mut in_flight = FuturesUnordered::new();
        in_flight.push(handler.handle_tagged_json(&slow));
        in_flight.push(handler.handle_tagged_json(&fast));
        let first: Value = serde_json::from_str(&in_flight.next().await.unwrap()).unwrap();
        assert_eq!(first["id"], "hrp");
        assert_eq!(first["payload"], HRP);

        let untagged = send(&handler, json!({"name": "GetBech32Hrp"})).await;
        assert!(untagged.get("id").is_none());

        let garbage: Value = serde_json::from_str(&handler.handle_tagged_json("{not json").await).unwrap();
        assert_eq!(garbage["type"], "Error");
        assert_eq!(garbage["kind"], "validation");
    })
    .await
    .expect("test_tagged_replies_complete_independently timed out");
}
