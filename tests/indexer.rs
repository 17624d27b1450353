//! Indexer, milestone and block-children routes against a scripted node

mod common;

use common::{url, ScriptedTransport};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use trinity_client::block::{AliasId, BlockId, MilestoneId, NftId, OutputId, TransactionId};
use trinity_client::message_interface::MessageHandler;
use trinity_client::node_api::indexer::QueryParameter;
use trinity_client::node_api::responses::{BlockChildrenResponse, OutputIdsResponse};
use trinity_client::node_api::routes;
use trinity_client::{Client, Error, ErrorKind};

fn output_id(byte: u8) -> OutputId {
    OutputId::new(TransactionId([byte; 32]), 0)
}

async fn client(transport: Arc<ScriptedTransport>) -> Client {
    Client::builder()
        .with_node(&url("a"))
        .with_node_sync_disabled()
        .with_transport(transport)
        .finish()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_alias_output_ids_follow_the_cursor() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let transport = ScriptedTransport::with_healthy_nodes(&["a"]);
        transport.reply(
            "a",
            &format!("{}?stateController=tri1q", routes::ALIAS_OUTPUTS),
            &OutputIdsResponse {
                items: vec![output_id(1)],
                cursor: Some("page&2".into()),
            },
        );
        transport.reply(
            "a",
            &format!("{}?cursor=page%262&stateController=tri1q", routes::ALIAS_OUTPUTS),
            &OutputIdsResponse {
                items: vec![output_id(2)],
                cursor: None,
            },
        );

        let client = client(transport.clone()).await;
        let ids = client
            .alias_output_ids(vec![QueryParameter::StateController("tri1q".into())])
            .await
            .unwrap();
        assert_eq!(ids.items, vec![output_id(1), output_id(2)]);
        assert!(ids.cursor.is_none());
        assert_eq!(transport.hosts_asked(routes::ALIAS_OUTPUTS).len(), 2);
    })
    .await
    .expect("test_alias_output_ids_follow_the_cursor timed out");
}

#[tokio::test]
async fn test_chain_output_lookup() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let alias_id = AliasId([4; 32]);
        let nft_id = NftId([5; 32]);
        let transport = ScriptedTransport::with_healthy_nodes(&["a"]);
        transport.reply(
            "a",
            &routes::alias_output(&alias_id),
            &OutputIdsResponse {
                items: vec![output_id(4)],
                cursor: None,
            },
        );
        transport.reply(
            "a",
            &routes::nft_output(&nft_id),
            &OutputIdsResponse {
                items: Vec::new(),
                cursor: None,
            },
        );

        let client = client(transport).await;
        assert_eq!(client.alias_output_id(&alias_id).await.unwrap(), output_id(4));

        let err = client.nft_output_id(&nft_id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "unexpected error {:?}", err);
        assert_eq!(err.kind(), ErrorKind::State);
    })
    .await
    .expect("test_chain_output_lookup timed out");
}

#[tokio::test]
async fn test_milestone_and_children_messages() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let parent = BlockId([6; 32]);
        let transport = ScriptedTransport::with_healthy_nodes(&["a"]);
        transport.reply(
            "a",
            &routes::milestone_by_index(42),
            &json!({
                "index": 42,
                "timestamp": 1_700_000_000u32,
                "previousMilestoneId": MilestoneId([1; 32]),
                "parents": [parent],
                "signatures": [],
            }),
        );
        transport.reply(
            "a",
            &routes::block_children(&parent),
            &BlockChildrenResponse {
                block_id: parent,
                max_results: 1000,
                count: 2,
                children: vec![BlockId([7; 32]), BlockId([8; 32])],
            },
        );
        let handler = MessageHandler::with_client(client(transport).await);

        let reply: Value = serde_json::from_str(
            &handler
                .handle_json(&json!({"name": "GetMilestoneByIndex", "data": {"index": 42}}).to_string())
                .await,
        )
        .unwrap();
        assert_eq!(reply["type"], "Success");
        assert_eq!(reply["payload"]["index"], 42);
        // fields the client does not model are passed through
        assert_eq!(reply["payload"]["signatures"], json!([]));

        let reply: Value = serde_json::from_str(
            &handler
                .handle_json(&json!({"name": "GetBlockChildren", "data": {"blockId": parent}}).to_string())
                .await,
        )
        .unwrap();
        assert_eq!(reply["payload"], json!([BlockId([7; 32]), BlockId([8; 32])]));
    })
    .await
    .expect("test_milestone_and_children_messages timed out");
}
