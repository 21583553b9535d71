//! Error types with fix suggestions
//!
//! Error code ranges:
//! - RUNBOOK-000-009: Decision parse errors
//! - RUNBOOK-010-019: Selector resolution errors
//! - RUNBOOK-020-029: Environment errors
//! - RUNBOOK-030-039: Script pre-flight errors
//! - RUNBOOK-040-049: Launch/outcome errors
//! - RUNBOOK-050-059: Store errors
//! - RUNBOOK-060-069: Config errors

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RunbookError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

fn format_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum RunbookError {
    // ═══════════════════════════════════════════
    // DECISION PARSE ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[RUNBOOK-001] Classifier response is not valid UTF-8: {details}")]
    InvalidEncoding { details: String },

    #[error("[RUNBOOK-002] Classifier response is not valid JSON: {details}")]
    DecisionSyntax { details: String },

    #[error("[RUNBOOK-003] Classifier response has the wrong shape: {details}")]
    DecisionSchema { details: String },

    // ═══════════════════════════════════════════
    // SELECTOR ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[RUNBOOK-010] Invalid workflow selector '{selector}': {reason}")]
    SelectorFormat { selector: String, reason: String },

    #[error("[RUNBOOK-011] Workflow selector '{selector}' points at position {index} but only {len} workflows exist")]
    IndexOutOfRange {
        selector: String,
        index: usize,
        len: usize,
    },

    #[error("[RUNBOOK-012] Workflow '{id}' not found")]
    WorkflowNotFound { id: String },

    // ═══════════════════════════════════════════
    // ENVIRONMENT ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[RUNBOOK-020] Argument key '{key}' for workflow '{workflow}' is not a valid environment variable name")]
    InvalidArgumentKey { workflow: String, key: String },

    #[error("[RUNBOOK-021] Argument keys {keys:?} for workflow '{workflow}' all map to variable '{variable}'")]
    ArgumentKeyCollision {
        workflow: String,
        variable: String,
        keys: Vec<String>,
    },

    // ═══════════════════════════════════════════
    // PRE-FLIGHT ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[RUNBOOK-030] Workflow '{workflow}' has no script configured")]
    ScriptNotConfigured { workflow: String },

    #[error("[RUNBOOK-031] Script for workflow '{workflow}' not found: {}", .path.display())]
    ScriptNotFound { workflow: String, path: PathBuf },

    #[error("[RUNBOOK-032] Script for workflow '{workflow}' is not executable: {}", .path.display())]
    ScriptNotExecutable { workflow: String, path: PathBuf },

    // ═══════════════════════════════════════════
    // LAUNCH / OUTCOME ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[RUNBOOK-040] Failed to start shell '{}' for workflow '{workflow}': {source}", .shell.display())]
    Spawn {
        workflow: String,
        shell: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[RUNBOOK-041] Workflow '{workflow}' failed with {}", format_exit(.code))]
    ExecutionFailed {
        workflow: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("[RUNBOOK-042] Invocation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("[RUNBOOK-043] Lost track of the script for workflow '{workflow}': {source}")]
    Wait {
        workflow: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════
    // STORE ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[RUNBOOK-050] Invalid workflow: {reason}")]
    InvalidWorkflow { reason: String },

    #[error("[RUNBOOK-051] Stored workflow list under '{key}' is corrupt: {details}")]
    StoreCorrupt { key: String, details: String },

    #[error("[RUNBOOK-052] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[RUNBOOK-053] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ═══════════════════════════════════════════
    // CONFIG ERRORS (060-069)
    // ═══════════════════════════════════════════
    #[error("[RUNBOOK-060] Configuration error: {reason}")]
    Config { reason: String },
}

impl RunbookError {
    /// Pipeline stage that produced this error, for logs and events
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidEncoding { .. }
            | Self::DecisionSyntax { .. }
            | Self::DecisionSchema { .. } => "parse",
            Self::SelectorFormat { .. }
            | Self::IndexOutOfRange { .. }
            | Self::WorkflowNotFound { .. } => "resolve",
            Self::InvalidArgumentKey { .. } | Self::ArgumentKeyCollision { .. } => "environment",
            Self::ScriptNotConfigured { .. }
            | Self::ScriptNotFound { .. }
            | Self::ScriptNotExecutable { .. } => "preflight",
            Self::Spawn { .. } | Self::Wait { .. } | Self::Timeout { .. } => "launch",
            Self::ExecutionFailed { .. } => "outcome",
            Self::InvalidWorkflow { .. }
            | Self::StoreCorrupt { .. }
            | Self::Io(_)
            | Self::Json(_) => "store",
            Self::Config { .. } => "config",
        }
    }
}

impl FixSuggestion for RunbookError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidEncoding { .. } => Some("Pass the classifier output as UTF-8 text"),
            Self::DecisionSyntax { .. } => {
                Some("Ensure the classifier returns bare JSON (no markdown fences)")
            }
            Self::DecisionSchema { .. } => Some(
                "Expected {\"workflow_id\": \"w<N>\", \"workflow_args\": {...}}",
            ),
            Self::SelectorFormat { .. } => {
                Some("Use one prefix character followed by a 1-based index, e.g. w2")
            }
            Self::IndexOutOfRange { .. } => {
                Some("Re-run the classifier against the current workflow catalog")
            }
            Self::WorkflowNotFound { .. } => Some("List workflows with `runbook list`"),
            Self::InvalidArgumentKey { .. } => Some(
                "Use argument keys made of letters, digits and underscores, or set key_policy = \"sanitize\"",
            ),
            Self::ArgumentKeyCollision { .. } => {
                Some("Argument keys must stay distinct after upper-casing")
            }
            Self::ScriptNotConfigured { .. } => {
                Some("Set a script with `runbook update <id> --script <path>`")
            }
            Self::ScriptNotFound { .. } => Some("Check the script path exists"),
            Self::ScriptNotExecutable { .. } => Some("Run `chmod u+x` on the script"),
            Self::Spawn { .. } => Some("Check the configured shell exists (RUNBOOK_SHELL)"),
            Self::Wait { .. } => Some("Re-run the workflow; the script's output could not be read"),
            Self::ExecutionFailed { .. } => Some("Inspect the script's stderr output above"),
            Self::Timeout { .. } => Some("Raise --timeout or check the script for hangs"),
            Self::InvalidWorkflow { .. } => Some("Give the workflow a non-empty name"),
            Self::StoreCorrupt { .. } => Some("Fix or remove the workflows.json file"),
            Self::Io(_) => Some("Check file path and permissions"),
            Self::Json(_) => None,
            Self::Config { .. } => Some("Check ~/.config/runbook/config.toml syntax"),
        }
    }
}
