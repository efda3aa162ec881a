//! Resource context: reference material injected into the system prompt.
//!
//! Resources share a fixed character budget, divided evenly. Each block is
//! cut to its share, so the section never exceeds the budget plus the two
//! delimiter lines, no matter how many or how large the resources are.

use serde::{Deserialize, Serialize};

pub const SOURCES_HEADER: &str = "--- RESOURCE SOURCES ---";
pub const SOURCES_FOOTER: &str = "--- END SOURCES ---";

/// Characters added around the budgeted body.
pub const DELIMITER_OVERHEAD: usize = SOURCES_HEADER.len() + 1 + SOURCES_FOOTER.len();

const BLOCK_SEPARATOR: &str = "\n\n";

/// A resource attached to a chat request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ResourceRef {
    /// Best available text: content, else summary, else url.
    pub fn text(&self) -> &str {
        [&self.content, &self.summary, &self.url]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }
}

/// Build the delimited sources section, or an empty string for no resources.
pub fn build_resource_context(resources: &[ResourceRef], budget_chars: usize) -> String {
    if resources.is_empty() {
        return String::new();
    }

    let share = budget_chars / resources.len();
    let room = share.saturating_sub(BLOCK_SEPARATOR.len());

    let mut out = String::with_capacity(budget_chars.min(64 * 1024) + DELIMITER_OVERHEAD);
    out.push_str(SOURCES_HEADER);
    out.push('\n');
    for resource in resources {
        let block = format!("[Source: {}]\n{}", resource.name, resource.text());
        let block = truncate_chars(&block, room);
        if block.is_empty() {
            continue;
        }
        out.push_str(block);
        out.push_str(BLOCK_SEPARATOR);
    }
    out.push_str(SOURCES_FOOTER);
    out
}

/// Append the sources section to a system prompt.
pub fn compose_system_prompt(base: &str, resources: &[ResourceRef], budget_chars: usize) -> String {
    let context = build_resource_context(resources, budget_chars);
    match (base.trim().is_empty(), context.is_empty()) {
        (_, true) => base.to_string(),
        (true, false) => context,
        (false, false) => format!("{base}\n\n{context}"),
    }
}

/// The longest prefix of `s` with at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
