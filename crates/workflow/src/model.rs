//! Workflow definitions: an ordered list of typed steps.

use notegraph_core::store::Record;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A user-authored pipeline. Persisted in the `workflows` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Store-assigned id (empty until saved)
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: StepKind,

    #[serde(default)]
    pub name: String,

    /// Per-type settings, e.g. `topic`, `objectId`, `prompt`
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// The closed set of step types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Research,
    Summarize,
    CreateItem,
    AddResource,
    GenerateContext,
    CustomPrompt,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Research => "research",
            StepKind::Summarize => "summarize",
            StepKind::CreateItem => "create_item",
            StepKind::AddResource => "add_resource",
            StepKind::GenerateContext => "generate_context",
            StepKind::CustomPrompt => "custom_prompt",
        }
    }

    /// Config keys that must be present and non-blank.
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            StepKind::CreateItem => &["objectId"],
            StepKind::GenerateContext => &["contextId"],
            StepKind::CustomPrompt => &["prompt"],
            StepKind::Research | StepKind::Summarize | StepKind::AddResource => &[],
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: kind.as_str().into(),
            config: BTreeMap::new(),
        }
    }

    /// Builder-style config entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// A config value, or `None` when missing or blank.
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

impl Workflow {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            steps,
        }
    }

    /// Every problem, including missing step config. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.structural_problems();
        for step in &self.steps {
            for key in step.kind.required_keys() {
                if step.config_value(key).is_none() {
                    problems.push(format!(
                        "step '{}' ({}) requires config '{key}'",
                        step.id, step.kind
                    ));
                }
            }
        }
        problems
    }

    /// Problems that make the step list unrunnable: empty name, no steps,
    /// empty or duplicate step ids. Missing step config is left to the
    /// engine, which reports it on the step itself.
    pub fn structural_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("workflow name must not be empty".to_string());
        }
        if self.steps.is_empty() {
            problems.push("workflow has no steps".to_string());
        }

        let mut seen = HashSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                problems.push(format!("step #{} has an empty id", i + 1));
            } else if !seen.insert(step.id.as_str()) {
                problems.push(format!("duplicate step id '{}'", step.id));
            }
        }
        problems
    }

    /// The stored form (everything except the id).
    pub fn to_data(&self) -> serde_json::Value {
        serde_json::json!({ "name": self.name, "steps": self.steps })
    }

    /// Rebuild a workflow from its store record.
    pub fn from_record(record: &Record) -> Result<Self, serde_json::Error> {
        let mut workflow: Workflow =
            serde_json::from_value(serde_json::Value::Object(record.data.clone()))?;
        workflow.id = record.id.clone();
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_json_uses_type_tag() {
        let json = r#"{
            "name": "Learn",
            "steps": [
                {"id": "s1", "type": "research", "name": "Look up", "config": {"topic": "Rust"}},
                {"id": "s2", "type": "create_item", "config": {"objectId": "o1"}}
            ]
        }"#;
        let wf: Workflow = serde_json::from_str(json).unwrap();
        assert_eq!(wf.steps[0].kind, StepKind::Research);
        assert_eq!(wf.steps[0].config_value("topic"), Some("Rust"));
        assert_eq!(wf.steps[1].kind, StepKind::CreateItem);
        assert!(wf.validate().is_empty());

        let out = serde_json::to_value(&wf.steps[1]).unwrap();
        assert_eq!(out["type"], "create_item");
    }

    #[test]
    fn unknown_step_type_is_rejected() {
        let json = r#"{"id": "s1", "type": "launch_rocket"}"#;
        assert!(serde_json::from_str::<Step>(json).is_err());
    }

    #[test]
    fn validate_reports_every_problem() {
        let wf = Workflow::new(
            " ",
            vec![
                Step::new("s1", StepKind::CustomPrompt),
                Step::new("s1", StepKind::Summarize),
                Step::new("", StepKind::GenerateContext).with("contextId", "  "),
            ],
        );
        let problems = wf.validate();
        assert_eq!(problems.len(), 5, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("duplicate step id 's1'")));
        assert!(problems.iter().any(|p| p.contains("requires config 'prompt'")));
        assert!(problems.iter().any(|p| p.contains("requires config 'contextId'")));
    }

    #[test]
    fn structural_problems_ignore_missing_config() {
        let wf = Workflow::new("Map", vec![Step::new("map", StepKind::GenerateContext)]);
        assert!(wf.structural_problems().is_empty());
        assert_eq!(wf.validate().len(), 1);
    }

    #[test]
    fn empty_workflow_is_invalid() {
        assert_eq!(Workflow::new("Empty", vec![]).validate(), vec!["workflow has no steps"]);
    }

    #[test]
    fn record_round_trip_keeps_store_id() {
        let wf = Workflow::new("Daily", vec![Step::new("s1", StepKind::Summarize)]);
        let data = match wf.to_data() {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let now = chrono::Utc::now();
        let record = Record {
            id: "wf-1".into(),
            created_at: now,
            updated_at: now,
            data,
        };
        let loaded = Workflow::from_record(&record).unwrap();
        assert_eq!(loaded.id, "wf-1");
        assert_eq!(loaded.steps, wf.steps);
    }
}
