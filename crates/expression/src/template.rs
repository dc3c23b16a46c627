//! Template substitution through strings, maps, and lists.
//!
//! Two placeholder forms, resolved in priority order:
//!
//! 1. `${expression}` — a full expression, replaced with the stringified
//!    result. Resolved first so expressions can compose variable lookups.
//! 2. `{{path}}` — a dot-separated path into the variable tree.
//!
//! Missing variables behave per [`TemplateMode`]: `Strict` fails, `Lenient`
//! leaves the placeholder text untouched and continues.

use serde_json::{Map, Value};

use crate::context::EvaluationContext;
use crate::error::ExpressionError;
use crate::eval::{Evaluator, stringify};
use crate::parser::parse;

/// Missing-variable policy for template processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateMode {
    /// A missing variable or failing expression is an error.
    Strict,
    /// Placeholders that cannot be resolved are left in place.
    #[default]
    Lenient,
}

/// Substitutes template placeholders against an [`EvaluationContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateProcessor {
    evaluator: Evaluator,
}

impl TemplateProcessor {
    /// Create a new processor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process any JSON value: strings are substituted, maps and lists are
    /// processed element-wise, scalars pass through untouched.
    pub fn process(
        &self,
        value: &Value,
        context: &EvaluationContext,
        mode: TemplateMode,
    ) -> Result<Value, ExpressionError> {
        match value {
            Value::String(s) => Ok(Value::String(self.process_string(s, context, mode)?)),
            Value::Object(map) => Ok(Value::Object(self.process_map(map, context, mode, None)?)),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.process(item, context, mode)?);
                }
                Ok(Value::Array(out))
            }
            scalar => Ok(scalar.clone()),
        }
    }

    /// Process a map. When `fields` is given, only the listed keys are
    /// substituted; everything else is copied verbatim.
    pub fn process_map(
        &self,
        map: &Map<String, Value>,
        context: &EvaluationContext,
        mode: TemplateMode,
        fields: Option<&[&str]>,
    ) -> Result<Map<String, Value>, ExpressionError> {
        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            let process = fields.is_none_or(|allowed| allowed.contains(&key.as_str()));
            let processed = if process {
                self.process(value, context, mode)?
            } else {
                value.clone()
            };
            out.insert(key.clone(), processed);
        }
        Ok(out)
    }

    /// Process a single string.
    pub fn process_string(
        &self,
        input: &str,
        context: &EvaluationContext,
        mode: TemplateMode,
    ) -> Result<String, ExpressionError> {
        // Early exit: nothing that looks like a placeholder.
        if !input.contains("${") && !input.contains("{{") {
            return Ok(input.to_string());
        }
        let after_expressions = self.substitute_expressions(input, context, mode)?;
        self.substitute_paths(&after_expressions, context, mode)
    }

    /// Pass 1: `${expression}` placeholders.
    fn substitute_expressions(
        &self,
        input: &str,
        context: &EvaluationContext,
        mode: TemplateMode,
    ) -> Result<String, ExpressionError> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];

            let Some(len) = matching_brace(after_open) else {
                if mode == TemplateMode::Strict {
                    return Err(ExpressionError::Template(
                        "unclosed '${' — expected closing '}'".into(),
                    ));
                }
                out.push_str(&rest[start..]);
                return Ok(out);
            };

            let source = &after_open[..len];
            let resolved = parse(source)
                .and_then(|expr| self.evaluator.eval(&expr, context));
            match resolved {
                Ok(value) => out.push_str(&stringify(&value)),
                Err(err) => {
                    if mode == TemplateMode::Strict {
                        return Err(ExpressionError::Template(format!(
                            "expression '{source}' failed: {err}"
                        )));
                    }
                    // Leave the original placeholder in place.
                    out.push_str(&rest[start..start + 2 + len + 1]);
                }
            }
            rest = &after_open[len + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Pass 2: `{{path}}` placeholders.
    fn substitute_paths(
        &self,
        input: &str,
        context: &EvaluationContext,
        mode: TemplateMode,
    ) -> Result<String, ExpressionError> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];

            let Some(end) = after_open.find("}}") else {
                if mode == TemplateMode::Strict {
                    return Err(ExpressionError::Template(
                        "unclosed '{{' — expected closing '}}'".into(),
                    ));
                }
                out.push_str(&rest[start..]);
                return Ok(out);
            };

            let path = after_open[..end].trim();
            match context.resolve_path(path) {
                Some(value) => out.push_str(&stringify(value)),
                None => {
                    if mode == TemplateMode::Strict {
                        return Err(ExpressionError::Template(format!(
                            "missing variable '{path}'"
                        )));
                    }
                    out.push_str(&rest[start..start + 2 + end + 2]);
                }
            }
            rest = &after_open[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Position of the `}` matching the start of `input`, tracking nesting.
fn matching_brace(input: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in input.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
