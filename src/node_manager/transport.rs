//! Transport seam between the dispatcher and the network

use crate::error::{Error, Result};
use crate::node_manager::Node;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::trace;

/// Raw reply of a node: status code and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResponse {
    pub status: u16,
    pub body: String,
    pub url: String,
}

impl NodeResponse {
    /// Maps non-success statuses onto the error taxonomy.
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            200..=299 => Ok(self),
            404 => Err(Error::NotFound(self.url)),
            401 | 403 => Err(Error::Unauthorized { url: self.url }),
            code => Err(Error::ResponseError {
                code,
                text: self.body,
                url: self.url,
            }),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Sends one request to one node. Timeouts, failover and quorum are the
/// dispatcher's business, not the transport's.
#[async_trait]
pub trait NodeTransport: Send + Sync + 'static {
    async fn get(&self, node: &Node, path: &str, query: Option<&str>) -> Result<NodeResponse>;

    async fn post_json(&self, node: &Node, path: &str, body: &serde_json::Value) -> Result<NodeResponse>;
}

/// HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    fn request(
        &self,
        method: reqwest::Method,
        node: &Node,
        path: &str,
        query: Option<&str>,
    ) -> Result<(reqwest::RequestBuilder, String)> {
        let url = node.endpoint(path, query)?;
        let mut request = self.client.request(method, url.clone());
        if let Some(auth) = &node.auth {
            if let Some(jwt) = &auth.jwt {
                request = request.bearer_auth(jwt);
            }
            if let Some((name, password)) = &auth.basic_auth_name_pwd {
                request = request.basic_auth(name, Some(password));
            }
        }
        Ok((request, url.to_string()))
    }

    async fn send(request: reqwest::RequestBuilder, url: String) -> Result<NodeResponse> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        trace!(%url, status, "node replied");
        Ok(NodeResponse { status, body, url })
    }
}

#[async_trait]
impl NodeTransport for HttpTransport {
    async fn get(&self, node: &Node, path: &str, query: Option<&str>) -> Result<NodeResponse> {
        let (request, url) = self.request(reqwest::Method::GET, node, path, query)?;
        Self::send(request, url).await
    }

    async fn post_json(&self, node: &Node, path: &str, body: &serde_json::Value) -> Result<NodeResponse> {
        let (request, url) = self.request(reqwest::Method::POST, node, path, None)?;
        Self::send(request.json(body), url).await
    }
}
