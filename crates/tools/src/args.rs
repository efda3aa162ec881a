//! Argument checks shared by the domain tools.
//!
//! Tool arguments come straight from the model, so every id and free-text
//! field goes through one of these before it reaches the store.

use notegraph_core::error::ToolError;
use serde_json::Value;

/// Longest accepted entity id.
pub const MAX_ID_LEN: usize = 128;

/// Longest accepted title or name.
pub const MAX_TITLE_CHARS: usize = 200;

/// Longest accepted long-form content.
pub const MAX_CONTENT_CHARS: usize = 100_000;

/// Default and maximum number of records a list tool returns.
pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;

/// Check that `id` is a plausible entity id.
pub fn validate_id(field: &str, id: &str) -> Result<(), ToolError> {
    if id.is_empty() {
        return Err(ToolError::InvalidArguments(format!("'{field}' must not be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(ToolError::InvalidArguments(format!(
            "'{field}' exceeds {MAX_ID_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
    {
        return Err(ToolError::InvalidArguments(format!(
            "'{field}' contains invalid characters"
        )));
    }
    Ok(())
}

pub fn require_id<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    let id = args[field]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{field}' must be a string")))?;
    validate_id(field, id)?;
    Ok(id)
}

pub fn optional_id<'a>(args: &'a Value, field: &str) -> Result<Option<&'a str>, ToolError> {
    match &args[field] {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        _ => require_id(args, field).map(Some),
    }
}

pub fn require_text<'a>(args: &'a Value, field: &str, max_chars: usize) -> Result<&'a str, ToolError> {
    let text = args[field]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("'{field}' must be a string")))?;
    if text.trim().is_empty() {
        return Err(ToolError::InvalidArguments(format!("'{field}' must not be blank")));
    }
    check_len(field, text, max_chars)?;
    Ok(text)
}

pub fn optional_text<'a>(
    args: &'a Value,
    field: &str,
    max_chars: usize,
) -> Result<Option<&'a str>, ToolError> {
    match &args[field] {
        Value::Null => Ok(None),
        Value::String(text) => {
            check_len(field, text, max_chars)?;
            Ok(Some(text))
        }
        _ => Err(ToolError::InvalidArguments(format!("'{field}' must be a string"))),
    }
}

/// Read the optional `limit` argument, clamped to `1..=MAX_LIST_LIMIT`.
pub fn limit(args: &Value) -> usize {
    args["limit"]
        .as_u64()
        .map(|n| (n as usize).clamp(1, MAX_LIST_LIMIT))
        .unwrap_or(DEFAULT_LIST_LIMIT)
}

fn check_len(field: &str, text: &str, max_chars: usize) -> Result<(), ToolError> {
    if text.chars().count() > max_chars {
        return Err(ToolError::InvalidArguments(format!(
            "'{field}' exceeds {max_chars} characters"
        )));
    }
    Ok(())
}
