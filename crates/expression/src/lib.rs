//! Template substitution and expression evaluation for flow descriptors.
//!
//! A node's `params` map is walked at prep time: each string value is
//! checked for `${ ... }` spans and run through [`ExpressionEngine::substitute`];
//! a node's script bodies (`transform`'s `script`, `condition`'s
//! `condition_script`) are run through [`ExpressionEngine::evaluate`].

pub mod ast;
pub mod builtins;
pub mod context;
pub mod error;
pub mod eval;
pub mod parser;
pub mod secrets_scan;
pub mod template;
pub mod value_utils;

pub use builtins::{BuiltinFn, BuiltinRegistry};
pub use context::{ConsoleSink, EvaluationContext, EvaluationContextBuilder, NullConsoleSink};
pub use error::{EvalError, ExpressionError, ExpressionResult, ParseError, Span};
pub use eval::Evaluator;
pub use secrets_scan::scan_secret_references;
pub use template::{substitute, Template, TemplatePart};

use serde_json::Value;

/// Facade combining a parser, an evaluator and the builtin registry;
/// this is what node implementations hold onto and call into.
#[derive(Default)]
pub struct ExpressionEngine {
    evaluator: Evaluator,
}

impl ExpressionEngine {
    /// Build an engine with the standard builtin function set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            evaluator: Evaluator::new(),
        }
    }

    /// Build an engine around a caller-supplied registry.
    #[must_use]
    pub fn with_builtins(registry: BuiltinRegistry) -> Self {
        Self {
            evaluator: Evaluator::with_builtins(registry),
        }
    }

    /// Scan `template` for `${ ... }` spans and substitute each against
    /// `context`. A template that is a single bare span returns that
    /// span's native value; otherwise the result is always a string.
    pub fn substitute(&self, template: &str, context: &EvaluationContext) -> ExpressionResult<Value> {
        template::substitute(template, &self.evaluator, context)
    }

    /// Parse and evaluate a full script body (statements plus an
    /// optional trailing `return`), returning the `return` value, or
    /// `null` if the script never returns.
    pub fn evaluate(&self, script: &str, context: &EvaluationContext) -> ExpressionResult<Value> {
        let expr = parser::parse_script(script)?;
        self.evaluator.eval(&expr, context).map_err(ExpressionError::Eval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitute_single_span_preserves_type() {
        let engine = ExpressionEngine::new();
        let ctx = EvaluationContext::builder().input(json!(7)).build();
        assert_eq!(engine.substitute("${ input }", &ctx).unwrap(), json!(7));
    }

    #[test]
    fn evaluate_runs_script_with_return() {
        let engine = ExpressionEngine::new();
        let ctx = EvaluationContext::builder().input(json!(2)).build();
        let result = engine
            .evaluate("let doubled = input * 2; return doubled;", &ctx)
            .unwrap();
        assert_eq!(result, json!(4));
    }

    #[test]
    fn evaluate_reports_parse_errors() {
        let engine = ExpressionEngine::new();
        let ctx = EvaluationContext::new();
        assert!(engine.evaluate("return (;", &ctx).is_err());
    }

    #[test]
    fn evaluate_throws_on_unresolved_secret() {
        let engine = ExpressionEngine::new();
        let ctx = EvaluationContext::new();
        let result = engine.evaluate("return secrets.missing;", &ctx);
        assert!(result.is_err());
    }

    #[test]
    fn substitute_treats_unresolved_secret_as_empty_string() {
        let engine = ExpressionEngine::new();
        let ctx = EvaluationContext::new();
        assert_eq!(engine.substitute("${ secrets.missing }", &ctx).unwrap(), json!(""));
    }
}
