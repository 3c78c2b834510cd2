//! `${token}` placeholder resolution for step parameters.
//!
//! Tokens:
//! - `form.<field>` or bare `<field>`: a submitted form value
//! - `steps.<step>`: the full result of an earlier step
//! - `steps.<step>.<path>`: a dot path into that result; numeric segments
//!   index arrays
//!
//! A string that is exactly one placeholder takes the referenced JSON value
//! as-is. Placeholders embedded in longer strings are stringified.

use serde_json::Value;
use thiserror::Error;

use super::context::ExecutionContext;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unresolved placeholder '${{{0}}}'")]
    Unresolved(String),
}

/// Resolve placeholders in every string nested inside `value`.
///
/// Object keys are left untouched.
pub fn resolve_value(value: &Value, ctx: &ExecutionContext) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => resolve_string(s, ctx),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, ctx)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve placeholders in a single string.
pub fn resolve_string(input: &str, ctx: &ExecutionContext) -> Result<Value, TemplateError> {
    if let Some(token) = whole_placeholder(input) {
        return lookup(token, ctx).ok_or_else(|| TemplateError::Unresolved(token.to_string()));
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: keep the remainder literally.
            break;
        };

        out.push_str(&rest[..start]);
        let token = after[..end].trim();
        let value = lookup(token, ctx).ok_or_else(|| TemplateError::Unresolved(token.to_string()))?;
        out.push_str(&stringify(&value));
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(Value::String(out))
}

fn whole_placeholder(input: &str) -> Option<&str> {
    let inner = input.strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains('}') || inner.contains("${") {
        return None;
    }
    Some(inner.trim())
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lookup(token: &str, ctx: &ExecutionContext) -> Option<Value> {
    if token.is_empty() {
        return None;
    }

    if let Some(field) = token.strip_prefix("form.") {
        return form_value(field, ctx);
    }

    if let Some(path) = token.strip_prefix("steps.") {
        let mut segments = path.split('.');
        let step = segments.next().filter(|s| !s.is_empty())?;
        let mut current = ctx.results.get(step)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        return Some(current.clone());
    }

    form_value(token, ctx)
}

fn form_value(field: &str, ctx: &ExecutionContext) -> Option<Value> {
    ctx.request
        .form_data
        .get(field)
        .filter(|v| !v.is_null())
        .cloned()
}
