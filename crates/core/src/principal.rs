//! The authenticated caller, as far as the orchestrator cares.
//!
//! Authentication happens outside the core; runs only carry the resulting
//! subject for logging and record attribution.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
}

impl Principal {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }

    /// The principal used when authentication is disabled.
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    pub fn is_anonymous(&self) -> bool {
        self.subject == "anonymous"
    }
}

impl Default for Principal {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.subject)
    }
}
