//! Transient run state: per-step progress records and the run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Workflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Error,
    /// The step's own model call observed cancellation.
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Done => "done",
            StepStatus::Error => "error",
            StepStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Error | StepStatus::Cancelled)
    }
}

/// One status report for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_id: String,
    pub status: StepStatus,
    /// Step output on `done`, failure reason on `error`, empty otherwise
    #[serde(default)]
    pub message: String,
}

impl StepProgress {
    pub fn new(step_id: impl Into<String>, status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// One execution of a workflow. Lives only as long as the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub workflow_id: String,
    pub status: RunStatus,
    /// Latest progress per step, in step order
    pub steps: Vec<StepProgress>,
    /// Output of the last completed step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn start(workflow: &Workflow) -> Self {
        Self {
            workflow_id: workflow.id.clone(),
            status: RunStatus::Running,
            steps: workflow
                .steps
                .iter()
                .map(|s| StepProgress::new(&s.id, StepStatus::Pending, ""))
                .collect(),
            output: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn record(&mut self, index: usize, progress: &StepProgress) {
        if let Some(slot) = self.steps.get_mut(index) {
            *slot = progress.clone();
        }
    }

    pub(crate) fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Number of steps that reached `status`.
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Step, StepKind};

    #[test]
    fn progress_serializes_camel_case() {
        let p = StepProgress::new("s1", StepStatus::Done, "ok");
        assert_eq!(
            serde_json::to_string(&p).unwrap(),
            r#"{"stepId":"s1","status":"done","message":"ok"}"#
        );
    }

    #[test]
    fn run_starts_with_pending_steps() {
        let wf = Workflow::new(
            "wf",
            vec![Step::new("a", StepKind::Summarize), Step::new("b", StepKind::Summarize)],
        );
        let mut run = WorkflowRun::start(&wf);
        assert_eq!(run.count(StepStatus::Pending), 2);

        run.record(0, &StepProgress::new("a", StepStatus::Done, "x"));
        run.finish(RunStatus::Completed);
        assert_eq!(run.count(StepStatus::Done), 1);
        assert!(run.finished_at.is_some());
        assert!(StepStatus::Cancelled.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
    }
}
