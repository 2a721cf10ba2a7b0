//! `email.send` / `email.receive`: the remaining leaf I/O node types,
//! behind `MailSender`/`MailReceiver` provider traits so the real
//! protocol work (SMTP via `lettre`, IMAP via `async-imap`) stays
//! swappable the same way `HttpClient`/`LlmProvider` are.

use std::sync::Arc;

use async_trait::async_trait;
use flowrunner_execution::ExecutionContext;
use flowrunner_expression::ExpressionEngine;
use flowrunner_workflow::NodeDescriptor;
use lettre::message::Message;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde_json::{json, Map, Value};

use crate::error::{NodeBuildError, NodeError};
use crate::node::{Node, NodePost, PreparedNode};
use crate::registry::NodeFactory;

use super::template_params::prep_common;

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct IncomingMail {
    pub from: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), NodeError>;
}

#[async_trait]
pub trait MailReceiver: Send + Sync {
    /// Fetch and drain up to `limit` unread messages from the mailbox
    /// named by `folder`.
    async fn fetch(&self, folder: &str, limit: usize) -> Result<Vec<IncomingMail>, NodeError>;
}

/// `lettre`-backed [`MailSender`] over SMTP with implicit TLS.
pub struct SmtpMailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailSender {
    pub fn new(relay: &str, username: String, password: String, from: String) -> Result<Self, NodeBuildError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(relay)
            .map_err(|e| NodeBuildError::InvalidParams {
                node_type: "email.send".to_string(),
                reason: format!("invalid SMTP relay {relay:?}: {e}"),
            })?
            .credentials(Credentials::new(username, password))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send(&self, mail: OutgoingMail) -> Result<(), NodeError> {
        let message = Message::builder()
            .from(self.from.parse().map_err(|e| NodeError::exec(format!("invalid from address: {e}")))?)
            .to(mail.to.parse().map_err(|e| NodeError::exec(format!("invalid to address: {e}")))?)
            .subject(mail.subject)
            .body(mail.body)
            .map_err(|e| NodeError::exec(e.to_string()))?;

        self.transport.send(message).await.map_err(|e| NodeError::exec(e.to_string()))?;
        Ok(())
    }
}

/// `async-imap`-backed [`MailReceiver`]. Connection setup (TLS
/// handshake, login) happens per `fetch` call — nodes are expected to
/// be invoked rarely enough relative to an IMAP session's cost that
/// pooling isn't worth the complexity here.
pub struct ImapMailReceiver {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl ImapMailReceiver {
    #[must_use]
    pub fn new(host: String, port: u16, username: String, password: String) -> Self {
        Self { host, port, username, password }
    }
}

#[async_trait]
impl MailReceiver for ImapMailReceiver {
    async fn fetch(&self, folder: &str, limit: usize) -> Result<Vec<IncomingMail>, NodeError> {
        let tcp = tokio::net::TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| NodeError::exec(format!("IMAP connect failed: {e}")))?;
        let tls = async_native_tls::TlsConnector::new();
        let tls_stream = tls
            .connect(&self.host, tcp)
            .await
            .map_err(|e| NodeError::exec(format!("IMAP TLS handshake failed: {e}")))?;

        let client = async_imap::Client::new(tls_stream);
        let mut session = client
            .login(&self.username, &self.password)
            .await
            .map_err(|(e, _)| NodeError::exec(format!("IMAP login failed: {e}")))?;

        session.select(folder).await.map_err(|e| NodeError::exec(e.to_string()))?;

        let uids = session.search("UNSEEN").await.map_err(|e| NodeError::exec(e.to_string()))?;
        let mut messages = Vec::new();
        for uid in uids.into_iter().take(limit) {
            let mut fetched = session
                .fetch(uid.to_string(), "RFC822")
                .await
                .map_err(|e| NodeError::exec(e.to_string()))?;
            use futures::StreamExt;
            while let Some(message) = fetched.next().await {
                let message = message.map_err(|e| NodeError::exec(e.to_string()))?;
                if let Some(body) = message.body() {
                    let parsed = mailparse::parse_mail(body).map_err(|e| NodeError::exec(e.to_string()))?;
                    let from = parsed.headers.get_first_value("From").unwrap_or_default();
                    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
                    let body = parsed.get_body().unwrap_or_default();
                    messages.push(IncomingMail { from, subject, body });
                }
            }
        }

        session.logout().await.map_err(|e| NodeError::exec(e.to_string()))?;
        Ok(messages)
    }
}

pub struct EmailSendNode {
    engine: Arc<ExpressionEngine>,
    sender: Arc<dyn MailSender>,
    params: Map<String, Value>,
}

impl EmailSendNode {
    fn from_descriptor(descriptor: &NodeDescriptor, sender: Arc<dyn MailSender>) -> Result<Self, NodeBuildError> {
        for required in ["to", "subject", "body"] {
            if !descriptor.params.contains_key(required) {
                return Err(NodeBuildError::InvalidParams {
                    node_type: "email.send".to_string(),
                    reason: format!("missing required param {required:?}"),
                });
            }
        }
        Ok(Self { engine: Arc::new(ExpressionEngine::new()), sender, params: descriptor.params.clone() })
    }
}

#[async_trait]
impl Node for EmailSendNode {
    async fn prep(&self, ctx: &ExecutionContext, node_id: &str, input: Value) -> Result<PreparedNode, NodeError> {
        prep_common(ctx, node_id, input, &self.params, &self.engine, &[]).await
    }

    async fn exec(&self, _ctx: &ExecutionContext, prepared: &PreparedNode) -> Result<Value, NodeError> {
        let to = prepared.param_str("to").ok_or_else(|| NodeError::exec("missing to"))?.to_string();
        let subject = prepared.param_str("subject").ok_or_else(|| NodeError::exec("missing subject"))?.to_string();
        let body = prepared.param_str("body").ok_or_else(|| NodeError::exec("missing body"))?.to_string();

        self.sender.send(OutgoingMail { to: to.clone(), subject: subject.clone(), body }).await?;

        Ok(json!({ "sent": true, "to": to, "subject": subject }))
    }

    async fn post(
        &self,
        _ctx: &ExecutionContext,
        _prepared: &PreparedNode,
        result: Value,
    ) -> Result<NodePost, NodeError> {
        Ok(NodePost::success(result))
    }
}

pub struct EmailReceiveNode {
    engine: Arc<ExpressionEngine>,
    receiver: Arc<dyn MailReceiver>,
    params: Map<String, Value>,
}

impl EmailReceiveNode {
    fn from_descriptor(descriptor: &NodeDescriptor, receiver: Arc<dyn MailReceiver>) -> Result<Self, NodeBuildError> {
        Ok(Self { engine: Arc::new(ExpressionEngine::new()), receiver, params: descriptor.params.clone() })
    }
}

#[async_trait]
impl Node for EmailReceiveNode {
    async fn prep(&self, ctx: &ExecutionContext, node_id: &str, input: Value) -> Result<PreparedNode, NodeError> {
        prep_common(ctx, node_id, input, &self.params, &self.engine, &[]).await
    }

    async fn exec(&self, _ctx: &ExecutionContext, prepared: &PreparedNode) -> Result<Value, NodeError> {
        let folder = prepared.param_str("folder").unwrap_or("INBOX");
        let limit = prepared.params.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;

        let messages = self.receiver.fetch(folder, limit).await?;
        let rendered: Vec<Value> = messages
            .into_iter()
            .map(|m| json!({ "from": m.from, "subject": m.subject, "body": m.body }))
            .collect();

        Ok(json!({ "messages": rendered }))
    }

    async fn post(
        &self,
        _ctx: &ExecutionContext,
        _prepared: &PreparedNode,
        result: Value,
    ) -> Result<NodePost, NodeError> {
        Ok(NodePost::success(result))
    }
}

#[must_use]
pub fn send_factory(sender: Arc<dyn MailSender>) -> NodeFactory {
    Arc::new(move |descriptor| Ok(Arc::new(EmailSendNode::from_descriptor(descriptor, Arc::clone(&sender))?) as Arc<dyn Node>))
}

#[must_use]
pub fn receive_factory(receiver: Arc<dyn MailReceiver>) -> NodeFactory {
    Arc::new(move |descriptor| Ok(Arc::new(EmailReceiveNode::from_descriptor(descriptor, Arc::clone(&receiver))?) as Arc<dyn Node>))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSender;

    #[async_trait]
    impl MailSender for FakeSender {
        async fn send(&self, _mail: OutgoingMail) -> Result<(), NodeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn exec_reports_sent_envelope() {
        let mut params = Map::new();
        params.insert("to".to_string(), Value::String("a@example.test".to_string()));
        params.insert("subject".to_string(), Value::String("hi".to_string()));
        params.insert("body".to_string(), Value::String("body".to_string()));
        let node = EmailSendNode { engine: Arc::new(ExpressionEngine::new()), sender: Arc::new(FakeSender), params };
        let prepared = PreparedNode {
            params: node.params.clone(),
            input: Value::Null,
            eval_ctx: flowrunner_expression::EvaluationContext::new(),
        };
        let ctx = crate::builtins::test_support::test_execution_context();
        let result = node.exec(&ctx, &prepared).await.unwrap();
        assert_eq!(result["sent"], json!(true));
    }
}
