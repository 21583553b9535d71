//! Script launcher
//!
//! Runs a workflow script as `<shell> <script>` with the resolved
//! environment layered over the inherited one, waits for exit and both
//! streams, then classifies the outcome. The exit status decides success;
//! stderr output on a successful run is kept as a warning.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::environment::ResolvedEnvironment;
use crate::error::{Result, RunbookError};
use crate::workflow::Workflow;

/// Default interpreter for workflow scripts
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Whether `path` can be launched by the current user
///
/// Unix: a regular file with the owner-execute bit. Elsewhere there are no
/// permission bits, so any regular file qualifies.
pub fn is_executable_by_current_user(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o100 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Success classification of a finished script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Exit 0, nothing on stderr
    Succeeded,
    /// Exit 0, but the script wrote to stderr
    SucceededWithWarnings,
}

/// Result of one successful script run
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub status: ExecutionStatus,
}

impl ExecutionReport {
    pub fn has_warnings(&self) -> bool {
        self.status == ExecutionStatus::SucceededWithWarnings
    }

    /// Stderr text of a successful run that still wrote to stderr
    pub fn warning(&self) -> Option<&str> {
        self.has_warnings().then_some(self.stderr.trim_end())
    }

    /// User-facing message: `None` for a clean run
    pub fn message(&self) -> Option<String> {
        self.warning().map(|stderr| {
            format!(
                "Workflow '{}' succeeded with stderr output: {}",
                self.workflow_name, stderr
            )
        })
    }
}

/// Spawns workflow scripts under a fixed shell
#[derive(Debug, Clone)]
pub struct ScriptLauncher {
    shell: PathBuf,
}

impl Default for ScriptLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl ScriptLauncher {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Check the script exists and is launchable, first failure wins
    pub fn preflight<'a>(&self, workflow: &'a Workflow) -> Result<&'a Path> {
        let path = workflow
            .script()
            .ok_or_else(|| RunbookError::ScriptNotConfigured {
                workflow: workflow.name.clone(),
            })?;

        if fs::metadata(path).is_err() {
            return Err(RunbookError::ScriptNotFound {
                workflow: workflow.name.clone(),
                path: path.to_path_buf(),
            });
        }

        if !is_executable_by_current_user(path) {
            return Err(RunbookError::ScriptNotExecutable {
                workflow: workflow.name.clone(),
                path: path.to_path_buf(),
            });
        }

        Ok(path)
    }

    /// Run the workflow's script and wait for it to finish
    #[instrument(skip(self, workflow, env), fields(workflow = %workflow.name))]
    pub async fn launch(
        &self,
        workflow: &Workflow,
        env: &ResolvedEnvironment,
    ) -> Result<ExecutionReport> {
        let script = self.preflight(workflow)?;

        info!(
            shell = %self.shell.display(),
            script = %script.display(),
            vars = env.len(),
            "launching script"
        );
        let started = Instant::now();

        let child = Command::new(&self.shell)
            .arg(script)
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunbookError::Spawn {
                workflow: workflow.name.clone(),
                shell: self.shell.clone(),
                source,
            })?;

        // Drains stdout and stderr concurrently, then reaps the child
        let output = child
            .wait_with_output()
            .await
            .map_err(|source| RunbookError::Wait {
                workflow: workflow.name.clone(),
                source,
            })?;
        let duration = started.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !stderr.is_empty() {
            warn!(stderr = %stderr.trim_end(), "script wrote to stderr");
        }

        let Some(exit_code) = output.status.code().filter(|code| *code == 0) else {
            let code = output.status.code();
            warn!(?code, duration_ms = duration.as_millis() as u64, "script failed");
            return Err(RunbookError::ExecutionFailed {
                workflow: workflow.name.clone(),
                code,
                stderr,
            });
        };

        // Any stderr byte counts, whitespace included
        let status = if stderr.is_empty() {
            ExecutionStatus::Succeeded
        } else {
            ExecutionStatus::SucceededWithWarnings
        };
        debug!(?status, duration_ms = duration.as_millis() as u64, "script finished");

        Ok(ExecutionReport {
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            exit_code,
            stdout,
            stderr,
            duration,
            status,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::environment::EnvironmentBuilder;
    use crate::value::{ArgMap, ArgValue};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn env_for(wf: &Workflow, pairs: &[(&str, &str)]) -> ResolvedEnvironment {
        let args: ArgMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ArgValue::from(*v)))
            .collect();
        EnvironmentBuilder::default().build(wf, &args).unwrap()
    }

    #[tokio::test]
    async fn clean_run_has_no_message() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "ok.sh", "echo \"hi $WORKFLOW_ARG_WHO\"\n", 0o755);
        let wf = Workflow::new("ok", "", "", path);
        let env = env_for(&wf, &[("who", "there")]);

        let report = ScriptLauncher::default().launch(&wf, &env).await.unwrap();
        assert_eq!(report.exit_code, 0);
        assert_eq!(report.stdout.trim(), "hi there");
        assert_eq!(report.status, ExecutionStatus::Succeeded);
        assert!(report.message().is_none());
    }

    #[tokio::test]
    async fn json_blob_is_exported() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "json.sh", "printf '%s' \"$WORKFLOW_ARGS_JSON\"\n", 0o700);
        let wf = Workflow::new("json", "", "", path);
        let env = env_for(&wf, &[("x", "1")]);

        let report = ScriptLauncher::default().launch(&wf, &env).await.unwrap();
        assert_eq!(report.stdout, r#"{"x":"1"}"#);
    }

    #[tokio::test]
    async fn inherited_environment_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "path.sh", "test -n \"$PATH\"\n", 0o755);
        let wf = Workflow::new("path", "", "", path);
        let env = env_for(&wf, &[]);

        assert!(ScriptLauncher::default().launch(&wf, &env).await.is_ok());
    }

    #[tokio::test]
    async fn stderr_with_exit_zero_is_success_with_warning() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "warn.sh", "echo careful >&2\nexit 0\n", 0o755);
        let wf = Workflow::new("warn", "", "", path);
        let env = env_for(&wf, &[]);

        let report = ScriptLauncher::default().launch(&wf, &env).await.unwrap();
        assert_eq!(report.status, ExecutionStatus::SucceededWithWarnings);
        assert_eq!(report.warning(), Some("careful"));
        assert!(report.message().unwrap().contains("careful"));
    }

    #[tokio::test]
    async fn whitespace_only_stderr_is_still_a_warning() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "nl.sh", "printf '\\n' >&2\n", 0o755);
        let wf = Workflow::new("newline", "", "", path);
        let env = env_for(&wf, &[]);

        let report = ScriptLauncher::default().launch(&wf, &env).await.unwrap();
        assert_eq!(report.stderr, "\n");
        assert_eq!(report.status, ExecutionStatus::SucceededWithWarnings);
        assert!(report.message().unwrap().contains("newline"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "fail.sh", "echo boom >&2\nexit 3\n", 0o755);
        let wf = Workflow::new("fail", "", "", path);
        let env = env_for(&wf, &[]);

        let err = ScriptLauncher::default().launch(&wf, &env).await.unwrap_err();
        match err {
            RunbookError::ExecutionFailed {
                workflow,
                code,
                stderr,
            } => {
                assert_eq!(workflow, "fail");
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_script_is_not_found() {
        let dir = TempDir::new().unwrap();
        let wf = Workflow::new("gone", "", "", dir.path().join("nope.sh"));
        let err = ScriptLauncher::default()
            .launch(&wf, &ResolvedEnvironment::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunbookError::ScriptNotFound { .. }));
    }

    #[tokio::test]
    async fn script_without_owner_execute_is_rejected() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let body = format!("touch {}\n", marker.display());
        let path = script(&dir, "noexec.sh", &body, 0o644);
        let wf = Workflow::new("noexec", "", "", path);

        let err = ScriptLauncher::default()
            .launch(&wf, &ResolvedEnvironment::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunbookError::ScriptNotExecutable { .. }));
        assert!(!marker.exists());
    }

    #[test]
    fn group_execute_alone_is_not_enough() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "g.sh", "true\n", 0o654);
        assert!(!is_executable_by_current_user(&path));
    }

    #[test]
    fn directories_are_not_executable_scripts() {
        let dir = TempDir::new().unwrap();
        assert!(!is_executable_by_current_user(dir.path()));
    }

    #[tokio::test]
    async fn unconfigured_script() {
        let wf = Workflow::new("blank", "", "", "");
        let err = ScriptLauncher::default()
            .launch(&wf, &ResolvedEnvironment::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunbookError::ScriptNotConfigured { .. }));
    }

    #[tokio::test]
    async fn missing_shell_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "ok.sh", "true\n", 0o755);
        let wf = Workflow::new("ok", "", "", path);

        let err = ScriptLauncher::new(dir.path().join("no-such-shell"))
            .launch(&wf, &ResolvedEnvironment::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunbookError::Spawn { .. }));
    }
}
