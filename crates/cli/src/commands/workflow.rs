//! `notegraph workflow run`: Run a workflow file and print progress.

use notegraph_agent::resources::truncate_chars;
use notegraph_config::AppConfig;
use notegraph_core::progress::CallbackReporter;
use notegraph_gateway::AppState;
use notegraph_workflow::{ExecutionContext, RunStatus, Scope, StepProgress, StepStatus, Workflow};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const PREVIEW_CHARS: usize = 80;

/// Read a workflow definition and check its structure.
///
/// A definition without an id takes the file stem. Missing step config is
/// not checked here; the engine reports it as that step's error.
pub fn load_workflow(path: &Path) -> Result<Workflow, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let mut workflow: Workflow = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid workflow file {}: {e}", path.display()))?;
    if workflow.id.is_empty() {
        workflow.id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workflow".into());
    }

    let problems = workflow.structural_problems();
    if !problems.is_empty() {
        return Err(format!("Invalid workflow: {}", problems.join("; ")).into());
    }
    Ok(workflow)
}

/// One console line for a progress transition.
pub fn progress_line(progress: &StepProgress) -> String {
    let first_line = progress.message.lines().next().unwrap_or("").trim();
    let preview = truncate_chars(first_line, PREVIEW_CHARS);
    let ellipsis = if preview.len() < progress.message.trim().len() { "..." } else { "" };
    match progress.status {
        StepStatus::Running => format!("  [{}] running", progress.step_id),
        StepStatus::Done => format!("  [{}] done: {preview}{ellipsis}", progress.step_id),
        StepStatus::Error => format!("  [{}] error: {}", progress.step_id, progress.message),
        status => format!("  [{}] {}", progress.step_id, status.as_str()),
    }
}

pub async fn run(
    file: impl AsRef<Path>,
    project: Option<String>,
    workspace: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let workflow = load_workflow(file.as_ref())?;
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let state = AppState::from_config(config)?;
    let agent = state.agent_for(None, None, None)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let ctx = ExecutionContext::new(state.store.clone(), Arc::new(agent))
        .with_scope(Scope::new(project, workspace))
        .with_cancel(cancel)
        .with_title_max_chars(state.config.workflow.title_max_chars);

    println!("Running workflow '{}' ({} steps)", workflow.name, workflow.steps.len());
    let reporter = CallbackReporter::new(|p: StepProgress| println!("{}", progress_line(&p)));
    let run = state.engine.run(&workflow, &ctx, &reporter).await;

    let done = run.count(StepStatus::Done);
    println!(
        "\nWorkflow {}: {done}/{} steps done",
        run.status.as_str(),
        run.steps.len()
    );
    match run.status {
        RunStatus::Completed => {
            if let Some(output) = &run.output {
                println!("\n{output}");
            }
            Ok(())
        }
        RunStatus::Failed => Err("Workflow failed".into()),
        RunStatus::Cancelled | RunStatus::Running => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_workflow_names_anonymous_definitions_after_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weekly-digest.json");
        std::fs::write(
            &path,
            r#"{"name":"Digest","steps":[{"id":"s1","type":"research","config":{"topic":"rust"}}]}"#,
        )
        .unwrap();

        let workflow = load_workflow(&path).unwrap();
        assert_eq!(workflow.id, "weekly-digest");
        assert_eq!(workflow.steps.len(), 1);
    }

    #[test]
    fn load_workflow_rejects_invalid_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"name":"","steps":[]}"#).unwrap();
        let err = load_workflow(&path).unwrap_err().to_string();
        assert!(err.contains("name"));

        std::fs::write(&path, r#"{"name":"Dup","steps":[{"id":"a","type":"summarize"},{"id":"a","type":"summarize"}]}"#).unwrap();
        assert!(load_workflow(&path).unwrap_err().to_string().contains("duplicate step id"));

        std::fs::write(&path, "not json").unwrap();
        assert!(load_workflow(&path).unwrap_err().to_string().contains("Invalid workflow file"));

        assert!(load_workflow(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn load_workflow_leaves_missing_config_to_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(
            &path,
            r#"{"name":"Map","steps":[{"id":"map","type":"generate_context"}]}"#,
        )
        .unwrap();

        let workflow = load_workflow(&path).unwrap();
        assert_eq!(workflow.steps.len(), 1);
        assert!(!workflow.validate().is_empty());
    }

    #[test]
    fn progress_lines_preview_long_output() {
        let running = StepProgress::new("s1", StepStatus::Running, "");
        assert_eq!(progress_line(&running), "  [s1] running");

        let long = "x".repeat(200);
        let done = progress_line(&StepProgress::new("s1", StepStatus::Done, long));
        assert!(done.ends_with("..."));
        assert!(done.len() < 120);

        let short = progress_line(&StepProgress::new("s2", StepStatus::Done, "ok"));
        assert_eq!(short, "  [s2] done: ok");

        let cancelled = progress_line(&StepProgress::new("s3", StepStatus::Cancelled, "cancelled"));
        assert_eq!(cancelled, "  [s3] cancelled");
    }
}
