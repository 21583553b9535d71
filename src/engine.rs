//! Workflow execution engine
//!
//! Pipeline: parse decision → resolve selector → build environment →
//! launch script. The first failing stage ends the invocation; nothing is
//! retried. Each invocation returns its own result.
//!
//! `execute` takes `&mut self`, so one engine runs one invocation at a
//! time and the store cannot change underneath a running pipeline.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::RunbookConfig;
use crate::decision::parse_decision;
use crate::environment::EnvironmentBuilder;
use crate::error::{Result, RunbookError};
use crate::event_log::{EventKind, EventLog};
use crate::launcher::{ExecutionReport, ScriptLauncher};
use crate::resolver::SelectorSnapshot;
use crate::store::{BlobStore, FileBlobStore, WorkflowStore};
use crate::value::ArgValue;
use crate::workflow::Workflow;

/// Single message surfaced to the user for one invocation
///
/// `None` after a clean run, the warning after a run that wrote to
/// stderr, the error text after any failure.
pub fn status_message(result: &Result<ExecutionReport>) -> Option<String> {
    match result {
        Ok(report) => report.message(),
        Err(e) => Some(e.to_string()),
    }
}

#[derive(Debug)]
pub struct Engine<B: BlobStore> {
    store: WorkflowStore<B>,
    builder: EnvironmentBuilder,
    launcher: ScriptLauncher,
    event_log: EventLog,
}

impl Engine<FileBlobStore> {
    /// Engine over the file store, shell and key policy from `config`
    pub fn from_config(config: &RunbookConfig) -> Result<Self> {
        let store = WorkflowStore::open(FileBlobStore::new(&config.store_dir))?;
        Ok(Self::new(
            store,
            EnvironmentBuilder::new(config.key_policy),
            ScriptLauncher::new(&config.shell),
        ))
    }
}

impl<B: BlobStore> Engine<B> {
    pub fn new(store: WorkflowStore<B>, builder: EnvironmentBuilder, launcher: ScriptLauncher) -> Self {
        Self {
            store,
            builder,
            launcher,
            event_log: EventLog::new(),
        }
    }

    pub fn store(&self) -> &WorkflowStore<B> {
        &self.store
    }

    pub fn events(&self) -> &EventLog {
        &self.event_log
    }

    pub fn launcher(&self) -> &ScriptLauncher {
        &self.launcher
    }

    // ─────────────────────────────────────────────────────────────
    // Workflow management
    // ─────────────────────────────────────────────────────────────

    pub fn add_workflow(&mut self, workflow: Workflow) -> Result<Uuid> {
        self.store.add(workflow)
    }

    pub fn update_workflow(&mut self, workflow: Workflow) -> Result<bool> {
        self.store.update(workflow)
    }

    pub fn delete_workflow(&mut self, id: Uuid) -> Result<bool> {
        self.store.delete(id)
    }

    pub fn workflow(&self, id: Uuid) -> Option<Workflow> {
        self.store.get(id)
    }

    pub fn workflows(&self) -> Vec<Workflow> {
        self.store.list()
    }

    /// Catalog to show the classifier; keep it to resolve the answer
    pub fn catalog(&self) -> Catalog {
        Catalog::from_workflows(self.store.as_slice())
    }

    pub fn snapshot(&self) -> SelectorSnapshot {
        self.store.snapshot()
    }

    // ─────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────

    /// Execute a decision against the current workflow positions
    pub async fn execute(&mut self, raw: &[u8]) -> Result<ExecutionReport> {
        let snapshot = self.store.snapshot();
        self.execute_with_snapshot(raw, &snapshot).await
    }

    /// Execute a decision against the positions captured in `snapshot`
    #[instrument(skip_all, fields(invocation = tracing::field::Empty))]
    pub async fn execute_with_snapshot(
        &mut self,
        raw: &[u8],
        snapshot: &SelectorSnapshot,
    ) -> Result<ExecutionReport> {
        let invocation = self.event_log.begin_invocation();
        tracing::Span::current().record("invocation", invocation);

        let result = self.run_pipeline(raw, snapshot).await;
        match &result {
            Ok(report) => info!(
                workflow = %report.workflow_name,
                warnings = report.has_warnings(),
                "invocation succeeded"
            ),
            Err(e) => {
                warn!(stage = e.stage(), error = %e, "invocation failed");
                self.event_log.emit(EventKind::InvocationFailed {
                    stage: e.stage().to_string(),
                    error: e.to_string(),
                });
            }
        }
        result
    }

    /// Close the latest invocation with a failure raised outside the
    /// pipeline, e.g. a caller-side timeout that dropped `execute`
    pub fn record_failure(&self, error: &RunbookError) {
        warn!(stage = error.stage(), error = %error, "invocation abandoned");
        self.event_log.emit(EventKind::InvocationFailed {
            stage: error.stage().to_string(),
            error: error.to_string(),
        });
    }

    async fn run_pipeline(
        &self,
        raw: &[u8],
        snapshot: &SelectorSnapshot,
    ) -> Result<ExecutionReport> {
        let decision = parse_decision(raw)?;
        self.event_log.emit(EventKind::DecisionParsed {
            selector: decision.workflow_id.clone(),
            args: ArgValue::Object(decision.workflow_args.clone()).to_json(),
        });

        let id = snapshot.resolve(&decision.workflow_id)?;
        let workflow = self
            .store
            .get(id)
            .ok_or_else(|| RunbookError::WorkflowNotFound { id: id.to_string() })?;
        let workflow_id: Arc<str> = Arc::from(workflow.id.to_string());
        debug!(selector = %decision.workflow_id, workflow = %workflow.name, "workflow resolved");
        self.event_log.emit(EventKind::WorkflowResolved {
            selector: decision.workflow_id.clone(),
            workflow_id: Arc::clone(&workflow_id),
            workflow_name: workflow.name.clone(),
        });

        let env = self.builder.build(&workflow, &decision.workflow_args)?;
        self.event_log.emit(EventKind::EnvironmentBuilt {
            workflow_id: Arc::clone(&workflow_id),
            variables: env.names(),
        });

        let script = self.launcher.preflight(&workflow)?;
        self.event_log.emit(EventKind::ScriptStarted {
            workflow_id: Arc::clone(&workflow_id),
            shell: self.launcher.shell().display().to_string(),
            script: script.display().to_string(),
        });

        let report = self.launcher.launch(&workflow, &env).await?;
        self.event_log.emit(EventKind::ScriptCompleted {
            workflow_id,
            exit_code: report.exit_code,
            warnings: report.has_warnings(),
            duration_ms: report.duration.as_millis() as u64,
        });
        Ok(report)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn engine() -> Engine<MemoryBlobStore> {
        let store = WorkflowStore::open(MemoryBlobStore::new()).unwrap();
        Engine::new(store, EnvironmentBuilder::default(), ScriptLauncher::default())
    }

    #[tokio::test]
    async fn parse_failure_records_stage() {
        let mut engine = engine();
        let result = engine.execute(b"not json").await;
        assert!(matches!(result, Err(RunbookError::DecisionSyntax { .. })));

        let events = engine.events().latest();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].kind,
            EventKind::InvocationFailed { stage, .. } if stage == "parse"
        ));
    }

    #[tokio::test]
    async fn successful_run_emits_every_stage() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();
        engine
            .add_workflow(Workflow::new("hello", "", "", script(&dir, "h.sh", "echo hi\n")))
            .unwrap();

        let result = engine
            .execute(br#"{"workflow_id":"w1","workflow_args":{"a":1}}"#)
            .await;
        assert!(status_message(&result).is_none());

        let kinds: Vec<_> = engine
            .events()
            .latest()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds.len(), 5);
        assert!(matches!(kinds[0], EventKind::DecisionParsed { .. }));
        assert!(matches!(kinds[4], EventKind::ScriptCompleted { exit_code: 0, .. }));
        if let EventKind::EnvironmentBuilt { variables, .. } = &kinds[2] {
            assert!(variables.contains(&"WORKFLOW_ARG_A".to_string()));
        }
    }

    #[tokio::test]
    async fn stale_snapshot_keeps_snapshotted_target() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();
        engine
            .add_workflow(Workflow::new("a", "", "", script(&dir, "a.sh", "echo a\n")))
            .unwrap();
        engine
            .add_workflow(Workflow::new("b", "", "", script(&dir, "b.sh", "echo b\n")))
            .unwrap();

        let catalog = engine.catalog();

        // Deleting "a" shifts "b" into position 1
        let a = engine.workflows()[0].id;
        engine.delete_workflow(a).unwrap();

        let report = engine
            .execute_with_snapshot(
                br#"{"workflow_id":"w2","workflow_args":{}}"#,
                catalog.snapshot(),
            )
            .await
            .unwrap();
        assert_eq!(report.stdout.trim(), "b");

        let err = engine
            .execute_with_snapshot(
                br#"{"workflow_id":"w1","workflow_args":{}}"#,
                catalog.snapshot(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RunbookError::WorkflowNotFound { .. }));
    }

    #[tokio::test]
    async fn abandoned_invocation_ends_with_failure_event() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();
        engine
            .add_workflow(Workflow::new("slow", "", "", script(&dir, "s.sh", "sleep 5\n")))
            .unwrap();

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            engine.execute(br#"{"workflow_id":"w1","workflow_args":{}}"#),
        )
        .await;
        assert!(outcome.is_err());

        engine.record_failure(&RunbookError::Timeout { seconds: 0 });
        let events = engine.events().latest();
        let last = events.last().unwrap();
        assert!(last.kind.is_terminal());
        assert!(matches!(
            &last.kind,
            EventKind::InvocationFailed { stage, .. } if stage == "launch"
        ));
        assert!(matches!(events[0].kind, EventKind::DecisionParsed { .. }));
    }

    #[test]
    fn status_message_for_failure_is_error_text() {
        let result: Result<ExecutionReport> = Err(RunbookError::SelectorFormat {
            selector: "w0".into(),
            reason: "index starts at 1".into(),
        });
        let msg = status_message(&result).unwrap();
        assert!(msg.contains("w0"));
    }
}
