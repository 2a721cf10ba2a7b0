//! `http.request`: performs a single HTTP call against a `HttpClient`
//! provider, the leaf I/O seam per SPEC_FULL.md §4.B — only the
//! `reqwest` adapter is real, any other transport is a plugin concern.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flowrunner_execution::ExecutionContext;
use flowrunner_expression::ExpressionEngine;
use flowrunner_workflow::NodeDescriptor;
use serde_json::{json, Map, Value};

use crate::error::{NodeBuildError, NodeError};
use crate::node::{Node, NodePost, PreparedNode};
use crate::registry::NodeFactory;

use super::template_params::prep_common;

/// An HTTP response reduced to what a flow ever needs to inspect.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

/// A request as assembled from a `http.request` node's params.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

/// Seam between `flowrunner-node` and an HTTP transport. `reqwest` is
/// the only real adapter implemented here; tests substitute a fake.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError>;
}

/// `reqwest`-backed [`HttpClient`].
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    #[must_use]
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| NodeError::exec(format!("invalid HTTP method {:?}: {e}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| NodeError::exec(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let bytes = response.bytes().await.map_err(|e| NodeError::exec(e.to_string()))?;
        let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes)));

        Ok(HttpResponse { status, headers, body })
    }
}

pub struct HttpRequestNode {
    engine: Arc<ExpressionEngine>,
    client: Arc<dyn HttpClient>,
    params: Map<String, Value>,
}

impl HttpRequestNode {
    fn from_descriptor(descriptor: &NodeDescriptor, client: Arc<dyn HttpClient>) -> Result<Self, NodeBuildError> {
        if !descriptor.params.contains_key("url") {
            return Err(NodeBuildError::InvalidParams {
                node_type: "http.request".to_string(),
                reason: "missing required param \"url\"".to_string(),
            });
        }
        Ok(Self { engine: Arc::new(ExpressionEngine::new()), client, params: descriptor.params.clone() })
    }
}

#[async_trait]
impl Node for HttpRequestNode {
    async fn prep(&self, ctx: &ExecutionContext, node_id: &str, input: Value) -> Result<PreparedNode, NodeError> {
        prep_common(ctx, node_id, input, &self.params, &self.engine, &[]).await
    }

    async fn exec(&self, _ctx: &ExecutionContext, prepared: &PreparedNode) -> Result<Value, NodeError> {
        let url = prepared.param_str("url").ok_or_else(|| NodeError::exec("missing url"))?.to_string();
        let method = prepared.param_str("method").unwrap_or("GET").to_string();
        let headers = prepared
            .params
            .get("headers")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let body = prepared.params.get("body").cloned();

        let response = self.client.send(HttpRequest { method, url, headers, body }).await?;

        Ok(json!({
            "status": response.status,
            "headers": response.headers,
            "body": response.body,
        }))
    }

    async fn post(
        &self,
        _ctx: &ExecutionContext,
        _prepared: &PreparedNode,
        result: Value,
    ) -> Result<NodePost, NodeError> {
        Ok(NodePost::success(result))
    }

    fn result_family(&self) -> Option<&'static str> {
        Some("http")
    }
}

#[must_use]
pub fn factory() -> NodeFactory {
    let client: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new());
    Arc::new(move |descriptor| {
        Ok(Arc::new(HttpRequestNode::from_descriptor(descriptor, Arc::clone(&client))?) as Arc<dyn Node>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeClient;

    #[async_trait]
    impl HttpClient for FakeClient {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError> {
            Ok(HttpResponse { status: 200, headers: HashMap::new(), body: json!({ "echo": request.url }) })
        }
    }

    #[tokio::test]
    async fn exec_reports_status_and_body() {
        let node = HttpRequestNode {
            engine: Arc::new(ExpressionEngine::new()),
            client: Arc::new(FakeClient),
            params: {
                let mut m = Map::new();
                m.insert("url".to_string(), Value::String("https://example.test".to_string()));
                m
            },
        };
        let prepared = PreparedNode {
            params: node.params.clone(),
            input: Value::Null,
            eval_ctx: flowrunner_expression::EvaluationContext::new(),
        };
        let execution = crate::builtins::test_support::test_execution_context();
        let result = node.exec(&execution, &prepared).await.unwrap();
        assert_eq!(result["status"], json!(200));
        assert_eq!(result["body"]["echo"], json!("https://example.test"));
    }
}
