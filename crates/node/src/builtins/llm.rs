//! `llm`: a single completion call against an `LlmProvider`, the other
//! leaf I/O seam per SPEC_FULL.md §4.B — one concrete adapter speaking
//! a generic OpenAI-style chat-completions HTTP contract over
//! `reqwest`.

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

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub prompt: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub raw: Value,
}

/// Seam between `flowrunner-node` and an LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, NodeError>;
}

/// Speaks the chat-completions shape shared by OpenAI and most
/// compatible self-hosted servers: `POST {base_url}/chat/completions`
/// with `{"model", "messages": [{"role": "user", "content": prompt}]}`.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiCompatibleProvider {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, NodeError> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&json!({
                "model": request.model,
                "messages": [{ "role": "user", "content": request.prompt }],
            }));
        if let Some(key) = &request.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| NodeError::exec(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NodeError::exec(format!("LLM provider returned {}", response.status())));
        }
        let raw: Value = response.json().await.map_err(|e| NodeError::exec(e.to_string()))?;
        let text = raw["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string();

        Ok(LlmResponse { text, raw })
    }
}

pub struct LlmNode {
    engine: Arc<ExpressionEngine>,
    provider: Arc<dyn LlmProvider>,
    params: Map<String, Value>,
}

impl LlmNode {
    fn from_descriptor(descriptor: &NodeDescriptor, provider: Arc<dyn LlmProvider>) -> Result<Self, NodeBuildError> {
        if !descriptor.params.contains_key("prompt") {
            return Err(NodeBuildError::InvalidParams {
                node_type: "llm".to_string(),
                reason: "missing required param \"prompt\"".to_string(),
            });
        }
        Ok(Self { engine: Arc::new(ExpressionEngine::new()), provider, params: descriptor.params.clone() })
    }
}

#[async_trait]
impl Node for LlmNode {
    async fn prep(&self, ctx: &ExecutionContext, node_id: &str, input: Value) -> Result<PreparedNode, NodeError> {
        prep_common(ctx, node_id, input, &self.params, &self.engine, &[]).await
    }

    async fn exec(&self, _ctx: &ExecutionContext, prepared: &PreparedNode) -> Result<Value, NodeError> {
        let model = prepared.param_str("model").unwrap_or("gpt-4").to_string();
        let prompt = prepared.param_str("prompt").ok_or_else(|| NodeError::exec("missing prompt"))?.to_string();
        let api_key = prepared.param_str("api_key").map(str::to_string);

        let response = self.provider.complete(LlmRequest { model, prompt, api_key }).await?;

        Ok(json!({ "text": response.text, "raw": response.raw }))
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
        Some("llm")
    }
}

#[must_use]
pub fn factory(base_url: impl Into<String>) -> NodeFactory {
    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatibleProvider::new(base_url.into()));
    Arc::new(move |descriptor| Ok(Arc::new(LlmNode::from_descriptor(descriptor, Arc::clone(&provider))?) as Arc<dyn Node>))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider;

    #[async_trait]
    impl LlmProvider for FakeProvider {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, NodeError> {
            Ok(LlmResponse { text: format!("echo: {}", request.prompt), raw: json!({}) })
        }
    }

    #[tokio::test]
    async fn exec_returns_provider_text() {
        let mut params = Map::new();
        params.insert("prompt".to_string(), Value::String("hello".to_string()));
        let node = LlmNode { engine: Arc::new(ExpressionEngine::new()), provider: Arc::new(FakeProvider), params };
        let prepared = PreparedNode {
            params: node.params.clone(),
            input: Value::Null,
            eval_ctx: flowrunner_expression::EvaluationContext::new(),
        };
        let ctx = crate::builtins::test_support::test_execution_context();
        let result = node.exec(&ctx, &prepared).await.unwrap();
        assert_eq!(result["text"], json!("echo: hello"));
    }
}
