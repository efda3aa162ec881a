//! The workflow engine: runs steps strictly in order.
//!
//! Each step's output becomes the next step's input. The first failing step
//! halts the pipeline. Cancellation is checked between steps; a step in
//! flight is only interrupted through its own model calls.

use crate::context::{ExecutionContext, StepError};
use crate::model::Workflow;
use crate::progress::{RunStatus, StepProgress, StepStatus, WorkflowRun};
use crate::steps::execute_step;
use chrono::Utc;
use notegraph_core::event::{DomainEvent, EventBus};
use notegraph_core::progress::{ProgressReporter, ReporterClosed};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Default)]
pub struct WorkflowEngine {
    event_bus: Option<Arc<EventBus>>,
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Execute a workflow, reporting `running` then `done`/`error` per step.
    ///
    /// A closed reporter stops the run as if it had been cancelled.
    pub async fn run(
        &self,
        workflow: &Workflow,
        ctx: &ExecutionContext,
        reporter: &dyn ProgressReporter<StepProgress>,
    ) -> WorkflowRun {
        let mut run = WorkflowRun::start(workflow);
        let mut previous: Option<String> = None;
        info!(
            workflow_id = %workflow.id,
            name = %workflow.name,
            steps = workflow.steps.len(),
            principal = %ctx.principal,
            "Starting workflow run"
        );

        let status = 'steps: {
            for (index, step) in workflow.steps.iter().enumerate() {
                if ctx.cancel.is_cancelled() {
                    info!(workflow_id = %workflow.id, next_step = %step.id, "Workflow run cancelled");
                    break 'steps RunStatus::Cancelled;
                }

                let running = StepProgress::new(&step.id, StepStatus::Running, "");
                if report(&mut run, index, running, reporter).await.is_err() {
                    break 'steps RunStatus::Cancelled;
                }
                info!(workflow_id = %workflow.id, step_id = %step.id, kind = %step.kind, "Step started");

                let progress = match execute_step(step, previous.as_deref(), ctx).await {
                    Ok(output) => {
                        info!(step_id = %step.id, output_chars = output.chars().count(), "Step done");
                        previous = Some(output.clone());
                        StepProgress::new(&step.id, StepStatus::Done, output)
                    }
                    Err(StepError::Cancelled) => {
                        info!(step_id = %step.id, "Step cancelled");
                        StepProgress::new(&step.id, StepStatus::Cancelled, "cancelled")
                    }
                    Err(e) => {
                        warn!(step_id = %step.id, kind = %step.kind, error = %e, "Step failed");
                        StepProgress::new(&step.id, StepStatus::Error, e.to_string())
                    }
                };

                let step_status = progress.status;
                self.publish(DomainEvent::StepFinished {
                    workflow_id: workflow.id.clone(),
                    step_id: step.id.clone(),
                    status: step_status.as_str().into(),
                    timestamp: Utc::now(),
                });
                let delivered = report(&mut run, index, progress, reporter).await.is_ok();

                match step_status {
                    StepStatus::Error => break 'steps RunStatus::Failed,
                    StepStatus::Cancelled => break 'steps RunStatus::Cancelled,
                    _ if !delivered => break 'steps RunStatus::Cancelled,
                    _ => {}
                }
            }
            RunStatus::Completed
        };

        info!(workflow_id = %workflow.id, status = status.as_str(), "Workflow run finished");
        run.output = previous;
        run.finish(status);
        run
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

async fn report(
    run: &mut WorkflowRun,
    index: usize,
    progress: StepProgress,
    reporter: &dyn ProgressReporter<StepProgress>,
) -> Result<(), ReporterClosed> {
    run.record(index, &progress);
    reporter.report(progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Step, StepKind};
    use notegraph_agent::AgentLoop;
    use notegraph_agent::test_helpers::{MOCK_MODEL, ScriptedProvider, StalledProvider};
    use notegraph_core::progress::{CallbackReporter, CollectingReporter};
    use notegraph_core::provider::Provider;
    use notegraph_core::tool::ToolRegistry;
    use notegraph_store::InMemoryStore;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn context(provider: Arc<dyn Provider>) -> ExecutionContext {
        let agent = AgentLoop::new(provider, MOCK_MODEL, Arc::new(ToolRegistry::new()));
        ExecutionContext::new(Arc::new(InMemoryStore::new()), Arc::new(agent))
    }

    fn statuses(events: &[StepProgress]) -> Vec<(String, StepStatus)> {
        events.iter().map(|p| (p.step_id.clone(), p.status)).collect()
    }

    fn seq(pairs: &[(&str, StepStatus)]) -> Vec<(String, StepStatus)> {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[tokio::test]
    async fn research_then_summarize_chains_output() {
        let provider = Arc::new(ScriptedProvider::texts(&["Facts about X.", "X, briefly."]));
        let ctx = context(provider.clone());
        let workflow = Workflow::new(
            "Learn X",
            vec![
                Step::new("s1", StepKind::Research).with("topic", "X"),
                Step::new("s2", StepKind::Summarize),
            ],
        );

        let sink = CollectingReporter::new();
        let run = WorkflowEngine::new().run(&workflow, &ctx, &sink).await;
        let events = sink.take();

        assert_eq!(
            statuses(&events),
            seq(&[
                ("s1", StepStatus::Running),
                ("s1", StepStatus::Done),
                ("s2", StepStatus::Running),
                ("s2", StepStatus::Done),
            ])
        );
        assert_eq!(events[1].message, "Facts about X.");
        let requests = provider.requests();
        let second_input = &requests[1].messages.last().unwrap().content;
        assert!(second_input.contains("Facts about X."));
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.output.as_deref(), Some("X, briefly."));
    }

    #[tokio::test]
    async fn failing_step_halts_the_pipeline() {
        let provider = Arc::new(ScriptedProvider::texts(&[]));
        let ctx = context(provider.clone());
        let workflow = Workflow::new(
            "Save",
            vec![
                Step::new("s1", StepKind::CreateItem),
                Step::new("s2", StepKind::AddResource),
            ],
        );

        let sink = CollectingReporter::new();
        let run = WorkflowEngine::new().run(&workflow, &ctx, &sink).await;
        let events = sink.take();

        assert_eq!(
            statuses(&events),
            seq(&[("s1", StepStatus::Running), ("s1", StepStatus::Error)])
        );
        assert!(events[1].message.contains("objectId"));
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.steps[1].status, StepStatus::Pending);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn completed_steps_never_exceed_first_error() {
        let cases: Vec<(Vec<Step>, usize)> = vec![
            (vec![Step::new("a", StepKind::Summarize), Step::new("b", StepKind::Summarize)], 2),
            (vec![Step::new("a", StepKind::Summarize), Step::new("b", StepKind::CustomPrompt)], 2),
            (vec![Step::new("a", StepKind::CustomPrompt), Step::new("b", StepKind::Summarize)], 1),
        ];
        for (steps, expected_finished) in cases {
            let ctx = context(Arc::new(ScriptedProvider::texts(&["x", "y"])));
            let workflow = Workflow::new("wf", steps);
            let run = WorkflowEngine::new()
                .run(&workflow, &ctx, &CollectingReporter::new())
                .await;
            let finished = run.count(StepStatus::Done) + run.count(StepStatus::Error);
            assert_eq!(finished, expected_finished);
        }
    }

    #[tokio::test]
    async fn cancellation_between_steps_stops_before_next_step() {
        let provider = Arc::new(ScriptedProvider::texts(&["step one output", "never"]));
        let cancel = CancellationToken::new();
        let ctx = context(provider.clone()).with_cancel(cancel.clone());
        let workflow = Workflow::new(
            "Two",
            vec![
                Step::new("s1", StepKind::Research).with("topic", "Y"),
                Step::new("s2", StepKind::Summarize),
            ],
        );

        let seen = std::sync::Mutex::new(Vec::new());
        let reporter = CallbackReporter::new(|p: StepProgress| {
            if p.status == StepStatus::Done {
                cancel.cancel();
            }
            seen.lock().unwrap().push(p);
        });
        let run = WorkflowEngine::new().run(&workflow, &ctx, &reporter).await;

        let events = seen.into_inner().unwrap();
        assert_eq!(
            statuses(&events),
            seq(&[("s1", StepStatus::Running), ("s1", StepStatus::Done)])
        );
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.steps[0].status, StepStatus::Done);
        assert_eq!(run.steps[1].status, StepStatus::Pending);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_step_is_marked_cancelled() {
        let cancel = CancellationToken::new();
        let ctx = context(Arc::new(StalledProvider)).with_cancel(cancel.clone());
        let workflow = Workflow::new(
            "Stuck",
            vec![Step::new("s1", StepKind::Research).with("topic", "Z")],
        );
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        let sink = CollectingReporter::new();
        let run = WorkflowEngine::new().run(&workflow, &ctx, &sink).await;
        assert_eq!(
            statuses(&sink.take()),
            seq(&[("s1", StepStatus::Running), ("s1", StepStatus::Cancelled)])
        );
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn closed_reporter_stops_the_run() {
        let provider = Arc::new(ScriptedProvider::texts(&["a", "b"]));
        let ctx = context(provider.clone());
        let workflow = Workflow::new(
            "wf",
            vec![
                Step::new("s1", StepKind::Research).with("topic", "T"),
                Step::new("s2", StepKind::Summarize),
            ],
        );
        let (tx, rx) = tokio::sync::mpsc::channel::<StepProgress>(4);
        drop(rx);

        let run = WorkflowEngine::new().run(&workflow, &ctx, &tx).await;
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn step_results_are_published() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let ctx = context(Arc::new(ScriptedProvider::texts(&[])));
        let workflow = Workflow::new("wf", vec![Step::new("s1", StepKind::Summarize)]);

        WorkflowEngine::new()
            .with_event_bus(bus)
            .run(&workflow, &ctx, &CollectingReporter::new())
            .await;

        let event = rx.try_recv().unwrap();
        match event.as_ref() {
            DomainEvent::StepFinished { step_id, status, .. } => {
                assert_eq!(step_id, "s1");
                assert_eq!(status, "done");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
