//! Evaluation context: the variable environment an expression or
//! template is evaluated against.
//!
//! Resolution precedence (most specific first): explicit parameters
//! bound by a lambda or higher-order builtin, then `shared`, `input`,
//! `secrets`, `env`. A name that doesn't match any of the four
//! top-level buckets and has no local binding resolves to `Value::Null`
//! for plain identifiers. `secrets.<key>` is special-cased at parse
//! time into its own AST node rather than plain property access,
//! because an unknown key's handling differs by call site — see
//! [`EvaluationContext::resolve_secret`] and `crate::template`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// A side effect sink for `console.log(...)` calls made from inside a
/// script body. The graph interpreter wires this to the execution's
/// log stream so script output lands in the same place as node logs.
pub trait ConsoleSink: Send + Sync {
    /// Record one `console.log` invocation's rendered message.
    fn log(&self, message: &str);
}

/// A sink that discards everything, used when no log wiring is needed
/// (unit tests, `substitute` calls outside of an execution).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConsoleSink;

impl ConsoleSink for NullConsoleSink {
    fn log(&self, _message: &str) {}
}

/// Variable environment used to resolve `input`, `shared`, `secrets`,
/// `env` and any locally bound names (lambda parameters, `$acc`).
#[derive(Clone)]
pub struct EvaluationContext {
    locals: HashMap<Arc<str>, Value>,
    shared: Arc<Value>,
    input: Arc<Value>,
    secrets: Arc<HashMap<String, String>>,
    env: Arc<HashMap<String, String>>,
    console: Arc<dyn ConsoleSink>,
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("locals", &self.locals)
            .field("shared", &self.shared)
            .field("input", &self.input)
            .field("secret_keys", &self.secrets.keys().collect::<Vec<_>>())
            .field("env_keys", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EvaluationContext {
    /// An empty context with no input, shared state, secrets or env.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locals: HashMap::new(),
            shared: Arc::new(Value::Null),
            input: Arc::new(Value::Null),
            secrets: Arc::new(HashMap::new()),
            env: Arc::new(HashMap::new()),
            console: Arc::new(NullConsoleSink),
        }
    }

    /// Start building a context.
    #[must_use]
    pub fn builder() -> EvaluationContextBuilder {
        EvaluationContextBuilder::default()
    }

    /// Bind a local variable (lambda parameter, `$acc`), shadowing any
    /// top-level bucket of the same name for the lifetime of this
    /// context clone.
    pub fn bind(&mut self, name: impl Into<Arc<str>>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    /// Record a `console.log` call.
    pub fn console_log(&self, message: &str) {
        self.console.log(message);
    }

    /// Resolve a top-level or local variable by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.locals.get(name) {
            return Some(v.clone());
        }
        match name {
            "shared" => Some((*self.shared).clone()),
            "input" => Some((*self.input).clone()),
            "secrets" => Some(Value::Object(
                self.secrets
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )),
            "env" => Some(Value::Object(
                self.env
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )),
            _ => None,
        }
    }

    /// Resolve `secrets.<key>`. `None` means the key is unknown; what
    /// that means for the caller depends on whether it's resolving a
    /// template span (empty string plus a warning) or a script
    /// (throws) — see [`crate::error::EvalError::unresolved_secret`].
    #[must_use]
    pub fn resolve_secret(&self, key: &str) -> Option<String> {
        self.secrets.get(key).cloned()
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`EvaluationContext`].
#[derive(Default)]
pub struct EvaluationContextBuilder {
    shared: Option<Value>,
    input: Option<Value>,
    secrets: HashMap<String, String>,
    env: HashMap<String, String>,
    console: Option<Arc<dyn ConsoleSink>>,
}

impl EvaluationContextBuilder {
    /// Set the `shared` bucket (the flow's shared mutable state snapshot).
    #[must_use]
    pub fn shared(mut self, value: Value) -> Self {
        self.shared = Some(value);
        self
    }

    /// Set the `input` bucket (the node's resolved input value).
    #[must_use]
    pub fn input(mut self, value: Value) -> Self {
        self.input = Some(value);
        self
    }

    /// Set the full `secrets` map for this execution's account scope.
    #[must_use]
    pub fn secrets(mut self, secrets: HashMap<String, String>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Set the full `env` map visible to expressions.
    #[must_use]
    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Wire `console.log` to a sink, typically the execution log stream.
    #[must_use]
    pub fn console(mut self, sink: Arc<dyn ConsoleSink>) -> Self {
        self.console = Some(sink);
        self
    }

    /// Build the context.
    #[must_use]
    pub fn build(self) -> EvaluationContext {
        EvaluationContext {
            locals: HashMap::new(),
            shared: Arc::new(self.shared.unwrap_or(Value::Null)),
            input: Arc::new(self.input.unwrap_or(Value::Null)),
            secrets: Arc::new(self.secrets),
            env: Arc::new(self.env),
            console: self.console.unwrap_or_else(|| Arc::new(NullConsoleSink)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_input_and_shared() {
        let ctx = EvaluationContext::builder()
            .input(json!({"a": 1}))
            .shared(json!({"b": 2}))
            .build();
        assert_eq!(ctx.resolve("input"), Some(json!({"a": 1})));
        assert_eq!(ctx.resolve("shared"), Some(json!({"b": 2})));
    }

    #[test]
    fn unknown_secret_resolves_to_none() {
        let ctx = EvaluationContext::new();
        assert_eq!(ctx.resolve_secret("missing"), None);
    }

    #[test]
    fn local_binding_shadows_top_level_bucket() {
        let mut ctx = EvaluationContext::builder().input(json!(1)).build();
        ctx.bind("input", json!(2));
        assert_eq!(ctx.resolve("input"), Some(json!(2)));
    }
}
