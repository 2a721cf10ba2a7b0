//! `${ ... }` template scanning and substitution.
//!
//! Unlike a `{{ }}`-style template engine, spans here open with `${`
//! and close on the matching `}`, counting nested `{`/`}` so object
//! literals (`${ {a: 1} }`) and nested index expressions don't
//! terminate the span early.

use serde_json::Value;
use tracing::warn;

use crate::context::EvaluationContext;
use crate::error::{ExpressionError, ExpressionResult, ParseError};
use crate::eval::Evaluator;
use crate::parser::parse_expression;

/// One piece of a parsed template: literal text, or a `${...}` span.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text copied through unchanged.
    Static(String),
    /// The source inside a `${ }` span, not yet parsed.
    Expression(String),
}

/// A template string parsed into static and expression parts.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    parts: Vec<TemplatePart>,
}

impl Template {
    /// Scan `source` for `${ ... }` spans.
    pub fn parse(source: impl Into<String>) -> ExpressionResult<Self> {
        let source = source.into();
        let parts = scan(&source)?;
        Ok(Self { source, parts })
    }

    /// The original, unparsed source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed parts.
    #[must_use]
    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    /// Whether this template contains at least one `${...}` span.
    #[must_use]
    pub fn has_expressions(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, TemplatePart::Expression(_)))
    }

    /// Substitute every span against `context`.
    ///
    /// If the whole template is a single span with no surrounding
    /// static text, that span's native value (number, object, array,
    /// ...) is returned unconverted. Otherwise every span is
    /// stringified and concatenated with the static text around it.
    pub fn render(&self, evaluator: &Evaluator, context: &EvaluationContext) -> ExpressionResult<Value> {
        if let [TemplatePart::Expression(src)] = self.parts.as_slice() {
            return Ok(self.eval_span(src, evaluator, context)?);
        }

        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                TemplatePart::Static(s) => out.push_str(s),
                TemplatePart::Expression(src) => {
                    let value = self.eval_span(src, evaluator, context)?;
                    match &value {
                        Value::String(s) => out.push_str(s),
                        other => out.push_str(&stringify(other)),
                    }
                }
            }
        }
        Ok(Value::String(out))
    }

    fn eval_span(&self, src: &str, evaluator: &Evaluator, context: &EvaluationContext) -> ExpressionResult<Value> {
        let expr = parse_expression(src.trim())?;
        match evaluator.eval(&expr, context) {
            Ok(value) => Ok(value),
            Err(e) => match &e.unresolved_secret {
                Some(key) => {
                    warn!(secret = key.as_str(), "unresolved secret in template span substituted as empty string");
                    Ok(Value::String(String::new()))
                }
                None => Err(ExpressionError::Eval(e)),
            },
        }
    }
}

/// Render-only convenience for callers that don't need to keep a
/// parsed [`Template`] around.
pub fn substitute(source: &str, evaluator: &Evaluator, context: &EvaluationContext) -> ExpressionResult<Value> {
    Template::parse(source)?.render(evaluator, context)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scan(source: &str) -> Result<Vec<TemplatePart>, ParseError> {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut parts = Vec::new();
    let mut static_buf = String::new();
    let mut i = 0;

    while i < len {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            if !static_buf.is_empty() {
                parts.push(TemplatePart::Static(std::mem::take(&mut static_buf)));
            }
            let span_start = i;
            let mut j = i + 2;
            let mut depth = 1usize;
            let mut in_string: Option<char> = None;
            while j < len && depth > 0 {
                let c = chars[j];
                if let Some(quote) = in_string {
                    if c == '\\' {
                        j += 1;
                    } else if c == quote {
                        in_string = None;
                    }
                } else {
                    match c {
                        '"' | '\'' => in_string = Some(c),
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                }
                j += 1;
            }
            if depth != 0 {
                return Err(ParseError::new("unclosed '${' span", span_start));
            }
            let inner: String = chars[i + 2..j - 1].iter().collect();
            parts.push(TemplatePart::Expression(inner));
            i = j;
        } else {
            static_buf.push(chars[i]);
            i += 1;
        }
    }
    if !static_buf.is_empty() {
        parts.push(TemplatePart::Static(static_buf));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use serde_json::json;

    fn evaluator() -> Evaluator {
        Evaluator::new()
    }

    #[test]
    fn static_only_template_has_no_expressions() {
        let t = Template::parse("hello world").unwrap();
        assert!(!t.has_expressions());
    }

    #[test]
    fn single_span_preserves_native_type() {
        let ctx = EvaluationContext::builder().input(json!(42)).build();
        let t = Template::parse("${ input }").unwrap();
        assert_eq!(t.render(&evaluator(), &ctx).unwrap(), json!(42));
    }

    #[test]
    fn single_span_preserves_object_type() {
        let ctx = EvaluationContext::builder().input(json!({"a": 1})).build();
        let t = Template::parse("${ input }").unwrap();
        assert_eq!(t.render(&evaluator(), &ctx).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn mixed_text_and_span_is_stringified() {
        let ctx = EvaluationContext::builder().input(json!(42)).build();
        let t = Template::parse("value = ${ input }!").unwrap();
        assert_eq!(t.render(&evaluator(), &ctx).unwrap(), json!("value = 42!"));
    }

    #[test]
    fn nested_braces_in_object_literal_do_not_close_span_early() {
        let ctx = EvaluationContext::new();
        let t = Template::parse("${ { a: 1, b: [1, 2] } }").unwrap();
        let result = t.render(&evaluator(), &ctx).unwrap();
        assert_eq!(result, json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn unclosed_span_is_a_parse_error() {
        assert!(Template::parse("hello ${ input").is_err());
    }

    #[test]
    fn unresolved_secret_in_span_substitutes_empty_string() {
        let ctx = EvaluationContext::new();
        let t = Template::parse("key=${ secrets.missing }").unwrap();
        assert_eq!(t.render(&evaluator(), &ctx).unwrap(), json!("key="));
    }

    #[test]
    fn multiple_spans_concatenate() {
        let ctx = EvaluationContext::builder().input(json!(2)).build();
        let t = Template::parse("${ input } + ${ input } = ${ input * 2 }").unwrap();
        assert_eq!(
            t.render(&evaluator(), &ctx).unwrap(),
            json!("2 + 2 = 4")
        );
    }
}
