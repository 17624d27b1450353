//! Quorum evaluation for idempotent reads
//!
//! The same request goes to `min_quorum_size` nodes concurrently. Replies are
//! grouped by their canonical JSON text and the largest group wins when its
//! share of the nodes that actually replied reaches the threshold. Nodes that
//! fail or time out shrink the denominator instead of counting as dissent.
//! The evaluator only reads; it never writes node health.

use crate::config::QuorumConfig;
use crate::error::{Error, Result};
use crate::node_manager::transport::NodeTransport;
use crate::node_manager::Node;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Winning response of a quorum read.
#[derive(Debug, Clone, PartialEq)]
pub struct QuorumOutcome {
    pub value: Value,
    /// URLs of the nodes that returned the winning response.
    pub agreeing: Vec<String>,
    pub respondents: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumEvaluator {
    pub min_quorum_size: usize,
    /// Required share of agreeing respondents, in percent.
    pub threshold: usize,
}

impl From<&QuorumConfig> for QuorumEvaluator {
    fn from(config: &QuorumConfig) -> Self {
        Self {
            min_quorum_size: config.min_quorum_size,
            threshold: config.threshold,
        }
    }
}

impl QuorumEvaluator {
    /// Queries the first `min_quorum_size` candidates and decides.
    pub async fn query(
        &self,
        transport: Arc<dyn NodeTransport>,
        candidates: &[Node],
        path: &str,
        query: Option<&str>,
        timeout: Duration,
    ) -> Result<QuorumOutcome> {
        if candidates.len() < self.min_quorum_size {
            return Err(Error::QuorumPoolSize {
                available: candidates.len(),
                required: self.min_quorum_size,
            });
        }

        let mut tasks = JoinSet::new();
        for node in candidates.iter().take(self.min_quorum_size).cloned() {
            let transport = Arc::clone(&transport);
            let path = path.to_string();
            let query = query.map(str::to_string);
            tasks.spawn(async move {
                let url = node.url.to_string();
                let reply = tokio::time::timeout(timeout, transport.get(&node, &path, query.as_deref())).await;
                let result = match reply {
                    Err(_) => Err(Error::Timeout { url: url.clone() }),
                    Ok(reply) => reply.and_then(|r| r.into_result()).and_then(|r| r.json::<Value>()),
                };
                (url, result)
            });
        }

        let mut responses = Vec::with_capacity(self.min_quorum_size);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((url, Ok(value))) => responses.push((url, value)),
                Ok((url, Err(e))) => warn!(%url, error = %e, "node left out of quorum"),
                Err(e) => warn!(error = %e, "quorum task failed"),
            }
        }
        self.decide(responses)
    }

    /// Picks the largest group of identical responses, if it is large enough.
    /// Two groups tied for largest never form a quorum.
    pub fn decide(&self, responses: Vec<(String, Value)>) -> Result<QuorumOutcome> {
        let respondents = responses.len();
        let mut groups: HashMap<String, (Value, Vec<String>)> = HashMap::new();
        for (url, value) in responses {
            let key = value.to_string();
            groups
                .entry(key)
                .or_insert_with(|| (value, Vec::new()))
                .1
                .push(url);
        }

        let mut ranked: Vec<(Value, Vec<String>)> = groups.into_values().collect();
        ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
        let agreeing = ranked.first().map_or(0, |(_, urls)| urls.len());
        let tied = ranked.get(1).map_or(false, |(_, urls)| urls.len() == agreeing);
        debug!(agreeing, respondents, tied, threshold = self.threshold, "quorum tally");

        match ranked.into_iter().next() {
            Some((value, urls)) if !tied && respondents > 0 && agreeing * 100 >= self.threshold * respondents => {
                Ok(QuorumOutcome {
                    value,
                    agreeing: urls,
                    respondents,
                })
            }
            _ => Err(Error::QuorumNotReached {
                agreeing,
                respondents,
                threshold: self.threshold,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evaluator() -> QuorumEvaluator {
        QuorumEvaluator {
            min_quorum_size: 3,
            threshold: 66,
        }
    }

    fn reply(url: &str, value: Value) -> (String, Value) {
        (url.to_string(), value)
    }

    #[test]
    fn test_two_of_three_accepted() {
        let outcome = evaluator()
            .decide(vec![
                reply("a", json!({"balance": 10})),
                reply("b", json!({"balance": 10})),
                reply("c", json!({"balance": 11})),
            ])
            .unwrap();
        assert_eq!(outcome.value, json!({"balance": 10}));
        assert_eq!(outcome.agreeing.len(), 2);
        assert_eq!(outcome.respondents, 3);
    }

    #[test]
    fn test_all_different_rejected() {
        let err = evaluator()
            .decide(vec![
                reply("a", json!(1)),
                reply("b", json!(2)),
                reply("c", json!(3)),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::QuorumNotReached {
                agreeing: 1,
                respondents: 3,
                threshold: 66
            }
        ));
    }

    #[test]
    fn test_key_order_does_not_split_groups() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();
        let outcome = evaluator()
            .decide(vec![reply("a", a), reply("b", b), reply("c", json!(0))])
            .unwrap();
        assert_eq!(outcome.agreeing.len(), 2);
    }

    #[test]
    fn test_missing_respondents_shrink_denominator() {
        let outcome = evaluator()
            .decide(vec![reply("a", json!(1)), reply("b", json!(1))])
            .unwrap();
        assert_eq!(outcome.respondents, 2);
    }

    #[test]
    fn test_no_respondents_is_not_consensus() {
        let err = evaluator().decide(vec![]).unwrap_err();
        assert!(matches!(err, Error::QuorumNotReached { respondents: 0, .. }));
    }

    #[test]
    fn test_full_agreement_required_at_100() {
        let strict = QuorumEvaluator {
            min_quorum_size: 2,
            threshold: 100,
        };
        assert!(strict
            .decide(vec![reply("a", json!(1)), reply("b", json!(2))])
            .is_err());
        assert!(strict
            .decide(vec![reply("a", json!(1)), reply("b", json!(1))])
            .is_ok());
    }

    #[test]
    fn test_tied_groups_never_agree() {
        let lenient = QuorumEvaluator {
            min_quorum_size: 4,
            threshold: 50,
        };
        for _ in 0..8 {
            let err = lenient
                .decide(vec![
                    reply("a", json!(1)),
                    reply("b", json!(1)),
                    reply("c", json!(2)),
                    reply("d", json!(2)),
                ])
                .unwrap_err();
            assert!(matches!(
                err,
                Error::QuorumNotReached {
                    agreeing: 2,
                    respondents: 4,
                    ..
                }
            ));
        }
        let outcome = lenient
            .decide(vec![
                reply("a", json!(1)),
                reply("b", json!(1)),
                reply("c", json!(2)),
                reply("d", json!(3)),
            ])
            .unwrap();
        assert_eq!(outcome.value, json!(1));
    }
}
