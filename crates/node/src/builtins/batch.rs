//! `batch` / `parallel_batch` / `worker_pool`: a single shared
//! implementation, since the three differ only in how `BatchStrategy`
//! schedules `processor_script` over `input.items` — the per-item
//! evaluation and partial-failure bookkeeping are identical.

use std::sync::Arc;

use async_trait::async_trait;
use flowrunner_execution::ExecutionContext;
use flowrunner_expression::ExpressionEngine;
use flowrunner_workflow::{BatchPolicy, BatchStrategy, NodeDescriptor};
use serde_json::{json, Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{NodeBuildError, NodeError};
use crate::node::{Node, NodePost, PreparedNode};
use crate::registry::NodeFactory;

use super::template_params::prep_common;

pub struct BatchNode {
    engine: Arc<ExpressionEngine>,
    policy: BatchPolicy,
    params: Map<String, Value>,
}

impl BatchNode {
    fn from_descriptor(node_type: &'static str, descriptor: &NodeDescriptor) -> Result<Self, NodeBuildError> {
        if !descriptor.params.contains_key("processor_script") {
            return Err(NodeBuildError::InvalidParams {
                node_type: node_type.to_string(),
                reason: "missing required param \"processor_script\"".to_string(),
            });
        }
        let policy = descriptor.batch.clone().ok_or_else(|| NodeBuildError::InvalidParams {
            node_type: node_type.to_string(),
            reason: "missing batch policy".to_string(),
        })?;
        policy.validate().map_err(|reason| NodeBuildError::InvalidParams {
            node_type: node_type.to_string(),
            reason: reason.to_string(),
        })?;
        Ok(Self {
            engine: Arc::new(ExpressionEngine::new()),
            policy,
            params: descriptor.params.clone(),
        })
    }
}

/// One item's outcome: its index (for stable ordering in the face of
/// out-of-order completion) plus the script's result or the error it
/// raised.
enum ItemOutcome {
    Ok { index: usize, value: Value },
    Err { index: usize, item: Value, error: String },
    TimedOut { index: usize },
}

/// Run `processor_script` against one item, cloning the shared
/// evaluation context and rebinding `input` to that item — cheap,
/// since secrets the script references were already resolved once at
/// `prep` time (see `ExecutionContext::build_evaluation_context`).
async fn run_item(
    engine: Arc<ExpressionEngine>,
    script: Arc<str>,
    mut eval_ctx: flowrunner_expression::EvaluationContext,
    index: usize,
    item: Value,
) -> ItemOutcome {
    eval_ctx.bind("input", item.clone());
    match engine.evaluate(&script, &eval_ctx) {
        Ok(value) => ItemOutcome::Ok { index, value },
        Err(err) => ItemOutcome::Err { index, item, error: err.to_string() },
    }
}

#[async_trait]
impl Node for BatchNode {
    async fn prep(&self, ctx: &ExecutionContext, node_id: &str, input: Value) -> Result<PreparedNode, NodeError> {
        prep_common(ctx, node_id, input, &self.params, &self.engine, &["processor_script"]).await
    }

    async fn exec(&self, ctx: &ExecutionContext, prepared: &PreparedNode) -> Result<Value, NodeError> {
        let items = prepared
            .input
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| NodeError::exec("input.items must be an array"))?;

        let script: Arc<str> = Arc::from(prepared.param_str("processor_script").unwrap_or_default());

        let outcomes = match self.policy.strategy {
            BatchStrategy::Sequential => {
                run_sequential(&self.engine, &script, &prepared.eval_ctx, &items, ctx).await?
            }
            BatchStrategy::Parallel => {
                run_chunked(Arc::clone(&self.engine), script, prepared.eval_ctx.clone(), items, &self.policy, ctx)
                    .await?
            }
            BatchStrategy::WorkerPool => {
                run_pooled(Arc::clone(&self.engine), script, prepared.eval_ctx.clone(), items, &self.policy, ctx)
                    .await?
            }
        };

        Ok(collect_outcomes(outcomes))
    }

    async fn post(
        &self,
        _ctx: &ExecutionContext,
        _prepared: &PreparedNode,
        result: Value,
    ) -> Result<NodePost, NodeError> {
        let failed_count = result["failed_items"].as_array().map_or(0, Vec::len);
        let succeeded_count = result["batch_results"].as_array().map_or(0, Vec::len);
        let all_failed = failed_count > 0 && succeeded_count == 0;
        let any_timed_out = result["timed_out"].as_bool().unwrap_or(false);

        let action = if any_timed_out {
            "timeout"
        } else if all_failed {
            flowrunner_workflow::ERROR_ACTION
        } else {
            flowrunner_workflow::SUCCESS_ACTION
        };
        Ok(NodePost::with_action(result, action))
    }

    // SPEC_FULL.md §3's alias set is closed to `llm` and `http.request`;
    // the batch family writes only `<node_id>_result` and `result`,
    // same as every other node type without a declared family slot.
}

async fn run_sequential(
    engine: &ExpressionEngine,
    script: &str,
    base_ctx: &flowrunner_expression::EvaluationContext,
    items: &[Value],
    ctx: &ExecutionContext,
) -> Result<Vec<ItemOutcome>, NodeError> {
    let mut outcomes = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if ctx.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let mut eval_ctx = base_ctx.clone();
        eval_ctx.bind("input", item.clone());
        match engine.evaluate(script, &eval_ctx) {
            Ok(value) => outcomes.push(ItemOutcome::Ok { index, value }),
            Err(err) => outcomes.push(ItemOutcome::Err { index, item: item.clone(), error: err.to_string() }),
        }
    }
    Ok(outcomes)
}

/// `parallel_batch`: chunk `items` by `batch_size`, bound in-flight
/// items across the whole batch by `max_parallel`, apply `timeout` (if
/// set) to each chunk independently.
async fn run_chunked(
    engine: Arc<ExpressionEngine>,
    script: Arc<str>,
    base_ctx: flowrunner_expression::EvaluationContext,
    items: Vec<Value>,
    policy: &BatchPolicy,
    ctx: &ExecutionContext,
) -> Result<Vec<ItemOutcome>, NodeError> {
    let semaphore = Arc::new(Semaphore::new(policy.max_parallel));
    let mut outcomes = Vec::with_capacity(items.len());

    for chunk in items.chunks(policy.batch_size.max(1)).map(<[Value]>::to_vec) {
        if ctx.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let chunk_start = outcomes.len();
        let chunk_len = chunk.len();
        let mut set: JoinSet<ItemOutcome> = JoinSet::new();
        for (offset, item) in chunk.into_iter().enumerate() {
            let permit = Arc::clone(&semaphore);
            let engine = Arc::clone(&engine);
            let script = Arc::clone(&script);
            let eval_ctx = base_ctx.clone();
            let index = chunk_start + offset;
            set.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                run_item(engine, script, eval_ctx, index, item).await
            });
        }

        let mut chunk_outcomes = Vec::new();
        let join_all = async {
            while let Some(joined) = set.join_next().await {
                chunk_outcomes.push(joined.unwrap_or_else(|_| ItemOutcome::Err {
                    index: 0,
                    item: Value::Null,
                    error: "item task panicked".to_string(),
                }));
            }
        };

        match policy.timeout {
            Some(timeout) => {
                if tokio::time::timeout(timeout, join_all).await.is_err() {
                    set.abort_all();
                    let finished: std::collections::HashSet<usize> =
                        chunk_outcomes.iter().map(outcome_index).collect();
                    for index in chunk_start..chunk_start + chunk_len {
                        if !finished.contains(&index) {
                            chunk_outcomes.push(ItemOutcome::TimedOut { index });
                        }
                    }
                }
            }
            None => join_all.await,
        }

        outcomes.extend(chunk_outcomes);
    }

    Ok(outcomes)
}

/// `worker_pool`: bound concurrency by `max_parallel` without chunk
/// boundaries; `timeout`, if set, bounds the whole batch rather than a
/// per-chunk slice.
async fn run_pooled(
    engine: Arc<ExpressionEngine>,
    script: Arc<str>,
    base_ctx: flowrunner_expression::EvaluationContext,
    items: Vec<Value>,
    policy: &BatchPolicy,
    ctx: &ExecutionContext,
) -> Result<Vec<ItemOutcome>, NodeError> {
    if ctx.is_cancelled() {
        return Err(NodeError::Cancelled);
    }
    let semaphore = Arc::new(Semaphore::new(policy.max_parallel));
    let mut set: JoinSet<ItemOutcome> = JoinSet::new();
    for (index, item) in items.into_iter().enumerate() {
        let permit = Arc::clone(&semaphore);
        let engine = Arc::clone(&engine);
        let script = Arc::clone(&script);
        let eval_ctx = base_ctx.clone();
        set.spawn(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore never closed");
            run_item(engine, script, eval_ctx, index, item).await
        });
    }

    let mut outcomes = Vec::new();
    let join_all = async {
        while let Some(joined) = set.join_next().await {
            outcomes.push(joined.unwrap_or_else(|_| ItemOutcome::Err {
                index: 0,
                item: Value::Null,
                error: "item task panicked".to_string(),
            }));
        }
    };

    match policy.timeout {
        Some(timeout) => {
            if tokio::time::timeout(timeout, join_all).await.is_err() {
                set.abort_all();
                outcomes.push(ItemOutcome::TimedOut { index: outcomes.len() });
            }
        }
        None => join_all.await,
    }

    Ok(outcomes)
}

fn outcome_index(outcome: &ItemOutcome) -> usize {
    match outcome {
        ItemOutcome::Ok { index, .. } | ItemOutcome::Err { index, .. } | ItemOutcome::TimedOut { index } => *index,
    }
}

fn collect_outcomes(mut outcomes: Vec<ItemOutcome>) -> Value {
    outcomes.sort_by_key(outcome_index);

    let mut batch_results = Vec::new();
    let mut failed_items = Vec::new();
    let mut timed_out = false;

    for outcome in outcomes {
        match outcome {
            ItemOutcome::Ok { value, .. } => batch_results.push(value),
            ItemOutcome::Err { index, item, error } => {
                failed_items.push(json!({ "index": index, "item": item, "error": error }));
            }
            ItemOutcome::TimedOut { index } => {
                timed_out = true;
                failed_items.push(json!({ "index": index, "item": Value::Null, "error": "timed out" }));
            }
        }
    }

    json!({
        "batch_results": batch_results,
        "failed_items": failed_items,
        "timed_out": timed_out,
    })
}

#[must_use]
pub fn batch_factory() -> NodeFactory {
    Arc::new(|descriptor| Ok(Arc::new(BatchNode::from_descriptor("batch", descriptor)?) as Arc<dyn Node>))
}

#[must_use]
pub fn parallel_batch_factory() -> NodeFactory {
    Arc::new(|descriptor| Ok(Arc::new(BatchNode::from_descriptor("parallel_batch", descriptor)?) as Arc<dyn Node>))
}

#[must_use]
pub fn worker_pool_factory() -> NodeFactory {
    Arc::new(|descriptor| Ok(Arc::new(BatchNode::from_descriptor("worker_pool", descriptor)?) as Arc<dyn Node>))
}
