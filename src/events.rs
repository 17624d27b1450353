//! Event subscriptions
//!
//! Callbacks register per topic. The first subscription opens a WebSocket
//! feed on the selected node (`api/events/v1`); topics are added and removed
//! with `{"subscribe": topic}` / `{"unsubscribe": topic}` frames and incoming
//! `{"topic", "payload"}` frames are dispatched to the callbacks of that
//! topic. Unsubscribing removes only the named topics. When a dropped feed is
//! reopened every registered topic is subscribed again.

use crate::block::{serde_hex, BlockId, OutputId, TransactionId};
use crate::error::{Error, Result};
use crate::node_manager::NodeManager;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

pub const EVENTS_ROUTE: &str = "api/events/v1";

/// A validated event topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    pub fn try_new(topic: impl Into<String>) -> Result<Self> {
        let topic = topic.into();
        let parts: Vec<&str> = topic.split('/').collect();
        let valid = match parts.as_slice() {
            ["milestones", "latest" | "confirmed"] => true,
            ["messages"] | ["blocks"] | ["blocks", "transaction"] | ["blocks", "tagged-data"] => true,
            ["blocks", "tagged-data", tag] => serde_hex::decode(tag).is_ok(),
            ["block-metadata", "referenced"] => true,
            ["block-metadata", id] => id.parse::<BlockId>().is_ok(),
            ["outputs", id] => id.parse::<OutputId>().is_ok(),
            ["outputs", "unlock", "address", address] => {
                crate::block::Address::is_valid_bech32(address)
            }
            ["transactions", id, "included-block"] => id.parse::<TransactionId>().is_ok(),
            _ => false,
        };
        if valid {
            Ok(Topic(topic))
        } else {
            Err(Error::InvalidTopic(topic))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Topic {
    type Error = Error;

    fn try_from(topic: String) -> Result<Self> {
        Topic::try_new(topic)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    pub payload: serde_json::Value,
}

pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

struct Connection {
    commands: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct BrokerState {
    handlers: RwLock<HashMap<Topic, Vec<EventCallback>>>,
}

impl BrokerState {
    fn dispatch(&self, event: &Event) {
        let callbacks = match Topic::try_new(event.topic.clone()) {
            Ok(topic) => self.handlers.read().get(&topic).cloned().unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        if callbacks.is_empty() {
            debug!(topic = %event.topic, "event without listener");
        }
        for callback in callbacks {
            callback(event);
        }
    }
}

pub struct EventBroker {
    manager: Arc<NodeManager>,
    state: Arc<BrokerState>,
    connection: Mutex<Option<Connection>>,
    // held from connect until the subscribe frames are queued
    connecting: tokio::sync::Mutex<()>,
}

impl EventBroker {
    pub fn new(manager: Arc<NodeManager>) -> Self {
        Self {
            manager,
            state: Arc::new(BrokerState::default()),
            connection: Mutex::new(None),
            connecting: tokio::sync::Mutex::new(()),
        }
    }

    /// Registers `callback` for every topic and opens the feed if needed.
    pub async fn subscribe<F>(&self, topics: Vec<Topic>, callback: F) -> Result<()>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        if self.manager.is_offline() {
            return Err(Error::OfflineMode);
        }
        let _connecting = self.connecting.lock().await;
        let reconnected = self.ensure_connected().await?;
        let new_topics = self.register(&topics, Arc::new(callback));
        let frames = if reconnected { self.topics() } else { new_topics };
        for topic in frames {
            self.send_frame(serde_json::json!({ "subscribe": topic.as_str() }).to_string())?;
        }
        Ok(())
    }

    /// Removes the callbacks of `topics`; an empty list removes all.
    pub fn unsubscribe(&self, topics: &[Topic]) -> Result<()> {
        let removed: Vec<Topic> = {
            let mut handlers = self.state.handlers.write();
            if topics.is_empty() {
                handlers.drain().map(|(topic, _)| topic).collect()
            } else {
                topics
                    .iter()
                    .filter(|topic| handlers.remove(*topic).is_some())
                    .cloned()
                    .collect()
            }
        };
        if self.connection.lock().is_some() {
            for topic in removed {
                self.send_frame(serde_json::json!({ "unsubscribe": topic.as_str() }).to_string())?;
            }
        }
        Ok(())
    }

    /// Closes the feed and forgets every callback.
    pub fn disconnect(&self) {
        if let Some(connection) = self.connection.lock().take() {
            connection.task.abort();
            info!("event feed disconnected");
        }
        self.state.handlers.write().clear();
    }

    /// Whether a feed is open and its reader still running.
    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .map_or(false, |connection| !connection.task.is_finished())
    }

    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.state.handlers.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Returns the topics that had no callback before.
    fn register(&self, topics: &[Topic], callback: EventCallback) -> Vec<Topic> {
        let mut handlers = self.state.handlers.write();
        let mut new_topics = Vec::new();
        for topic in topics {
            let entry = handlers.entry(topic.clone()).or_default();
            if entry.is_empty() {
                new_topics.push(topic.clone());
            }
            entry.push(Arc::clone(&callback));
        }
        new_topics
    }

    fn send_frame(&self, frame: String) -> Result<()> {
        match self.connection.lock().as_ref() {
            Some(connection) => connection
                .commands
                .send(frame)
                .map_err(|_| Error::Events("event feed closed".to_string())),
            None => Err(Error::Events("event feed not connected".to_string())),
        }
    }

    /// Returns `true` when a new feed was opened.
    async fn ensure_connected(&self) -> Result<bool> {
        if self.is_connected() {
            return Ok(false);
        }

        let node = self.manager.get_node()?;
        let mut url = node.endpoint(EVENTS_ROUTE, None)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| Error::Events(format!("cannot derive websocket url from {}", node.url)))?;

        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::Events(e.to_string()))?;
        info!(%url, "event feed connected");

        let (mut sink, mut source) = stream.split();
        let (commands, mut pending) = mpsc::unbounded_channel::<String>();
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = pending.recv() => match command {
                        Some(frame) => {
                            if let Err(e) = sink.send(Message::Text(frame)).await {
                                warn!(error = %e, "event feed write failed");
                                break;
                            }
                        }
                        None => break,
                    },
                    frame = source.next() => match frame {
                        Some(Ok(Message::Text(text))) => match serde_json::from_str::<Event>(&text) {
                            Ok(event) => state.dispatch(&event),
                            Err(e) => debug!(error = %e, "ignoring malformed event"),
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "event feed read failed");
                            break;
                        }
                    },
                }
            }
        });

        let previous = self.connection.lock().replace(Connection { commands, task });
        if let Some(previous) = previous {
            previous.task.abort();
        }
        Ok(true)
    }
}

impl Drop for EventBroker {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, NodeConfig};
    use crate::node_manager::transport::HttpTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn broker(url: &str) -> EventBroker {
        let config = ClientConfig {
            nodes: vec![NodeConfig::new(url)],
            ignore_node_health: true,
            ..Default::default()
        };
        let transport = Arc::new(HttpTransport::new("test").unwrap());
        EventBroker::new(Arc::new(NodeManager::new(&config, transport).unwrap()))
    }

    fn topic(s: &str) -> Topic {
        Topic::try_new(s).unwrap()
    }

    #[test]
    fn test_topic_validation() {
        assert!(Topic::try_new("milestones/confirmed").is_ok());
        assert!(Topic::try_new("messages").is_ok());
        assert!(Topic::try_new(format!("block-metadata/0x{}", "00".repeat(32))).is_ok());
        assert!(Topic::try_new("milestones/unknown").is_err());
        assert!(Topic::try_new("block-metadata/0x12").is_err());
        assert!(Topic::try_new("").is_err());
    }

    #[test]
    fn test_unsubscribe_is_isolated() {
        let broker = broker("http://127.0.0.1:1");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let callback: EventCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        broker.register(&[topic("messages"), topic("milestones/confirmed")], callback);

        broker.unsubscribe(&[topic("messages")]).unwrap();
        assert_eq!(broker.topics(), vec![topic("milestones/confirmed")]);

        for t in ["messages", "milestones/confirmed"] {
            broker.state.dispatch(&Event {
                topic: t.to_string(),
                payload: serde_json::Value::Null,
            });
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        broker.disconnect();
        assert!(broker.topics().is_empty());
    }

    #[tokio::test]
    async fn test_feed_delivers_events() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let (tcp, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                while let Some(Ok(Message::Text(text))) = ws.next().await {
                    let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                    if let Some(topic) = frame["subscribe"].as_str() {
                        let event = serde_json::json!({"topic": topic, "payload": {"index": 7}});
                        ws.send(Message::Text(event.to_string())).await.unwrap();
                    }
                }
            });

            let broker = broker(&format!("http://{}", addr));
            let (tx, mut rx) = mpsc::unbounded_channel();
            broker
                .subscribe(vec![topic("milestones/latest")], move |event| {
                    let _ = tx.send(event.clone());
                })
                .await
                .unwrap();

            let event = rx.recv().await.unwrap();
            assert_eq!(event.topic, "milestones/latest");
            assert_eq!(event.payload["index"], 7);
            broker.disconnect();
        })
        .await
        .expect("test_feed_delivers_events timed out");
    }

    #[tokio::test]
    async fn test_reconnect_resubscribes_registered_topics() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (frames_tx, mut frames) = mpsc::unbounded_channel::<(usize, String)>();
            tokio::spawn(async move {
                for connection in 0.. {
                    let (tcp, _) = listener.accept().await.unwrap();
                    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                    let frames_tx = frames_tx.clone();
                    tokio::spawn(async move {
                        while let Some(Ok(Message::Text(text))) = ws.next().await {
                            let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                            let topic = frame["subscribe"].as_str().unwrap_or_default().to_string();
                            let _ = frames_tx.send((connection, topic));
                            // the first feed dies after one frame
                            if connection == 0 {
                                break;
                            }
                        }
                    });
                }
            });

            let broker = broker(&format!("http://{}", addr));
            broker.subscribe(vec![topic("milestones/latest")], |_| {}).await.unwrap();
            assert_eq!(frames.recv().await.unwrap(), (0, "milestones/latest".to_string()));
            while broker.is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            broker.subscribe(vec![topic("milestones/confirmed")], |_| {}).await.unwrap();
            let mut resent = vec![frames.recv().await.unwrap(), frames.recv().await.unwrap()];
            resent.sort();
            assert_eq!(
                resent,
                vec![
                    (1, "milestones/confirmed".to_string()),
                    (1, "milestones/latest".to_string())
                ]
            );
            assert_eq!(broker.topics().len(), 2);
            broker.disconnect();
        })
        .await
        .expect("test_reconnect_resubscribes_registered_topics timed out");
    }

    #[tokio::test]
    async fn test_concurrent_subscribes_share_one_feed() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let accepted = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&accepted);
            tokio::spawn(async move {
                loop {
                    let (tcp, _) = listener.accept().await.unwrap();
                    counter.fetch_add(1, Ordering::SeqCst);
                    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                    tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
                }
            });

            let broker = broker(&format!("http://{}", addr));
            let (a, b) = tokio::join!(
                broker.subscribe(vec![topic("milestones/latest")], |_| {}),
                broker.subscribe(vec![topic("milestones/confirmed")], |_| {}),
            );
            a.unwrap();
            b.unwrap();
            assert!(broker.is_connected());
            assert_eq!(accepted.load(Ordering::SeqCst), 1);
            broker.disconnect();
        })
        .await
        .expect("test_concurrent_subscribes_share_one_feed timed out");
    }
}
