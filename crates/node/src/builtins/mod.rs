//! Built-in node-type implementations. Each submodule owns one or a
//! small family of related node types and exposes a `*_factory`
//! function for registration; see [`register_defaults`].

mod batch;
mod condition;
mod email;
mod http;
mod llm;
mod split_join;
mod template_params;
#[cfg(test)]
mod test_support;
mod transform;
mod wait;

pub use batch::BatchNode;
pub use condition::ConditionNode;
pub use email::{EmailReceiveNode, EmailSendNode, IncomingMail, MailReceiver, MailSender, OutgoingMail};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use llm::{LlmProvider, LlmRequest, LlmResponse, OpenAiCompatibleProvider};
pub use split_join::{JoinNode, SplitNode};
pub use transform::TransformNode;
pub use wait::WaitNode;

use std::sync::Arc;

use crate::registry::NodeRegistry;

/// Register every node type this crate ships built-in: the structural
/// types implemented for real (`transform`, `condition`, `wait`,
/// `split`, `join`, `batch`, `parallel_batch`, `worker_pool`) plus the
/// leaf I/O types wired to their default real-world provider
/// (`http.request` over `reqwest`, `llm` over a generic OpenAI-
/// compatible endpoint). `email.send`/`email.receive` are left to the
/// caller to register via [`email::send_factory`]/[`email::receive_factory`]
/// since they need account-specific SMTP/IMAP credentials a generic
/// default can't supply.
pub fn register_defaults(registry: &mut NodeRegistry, llm_base_url: impl Into<String>) {
    registry.register_builtin("transform", transform::factory());
    registry.register_builtin("condition", condition::factory());
    registry.register_builtin("wait", wait::factory());
    registry.register_builtin("split", split_join::split_factory());
    registry.register_builtin("join", split_join::join_factory());
    registry.register_builtin("batch", batch::batch_factory());
    registry.register_builtin("parallel_batch", batch::parallel_batch_factory());
    registry.register_builtin("worker_pool", batch::worker_pool_factory());
    registry.register_builtin("http.request", http::factory());
    registry.register_builtin("llm", llm::factory(llm_base_url));
}

/// Register `email.send`/`email.receive` against a specific account's
/// mail credentials. Kept separate from [`register_defaults`] because,
/// unlike the other built-ins, a single process-wide factory can't
/// serve every account — see `flowrunner-manager`, which calls this
/// once per account the first time a flow using email nodes is loaded.
pub fn register_email(
    registry: &mut NodeRegistry,
    sender: Arc<dyn MailSender>,
    receiver: Arc<dyn MailReceiver>,
) {
    registry.register_builtin("email.send", email::send_factory(sender));
    registry.register_builtin("email.receive", email::receive_factory(receiver));
}
