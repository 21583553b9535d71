//! Runbook - run local workflow scripts chosen by an LLM classifier
//!
//! A classifier reads a transcript and answers with
//! `{"workflow_id": "w2", "workflow_args": {...}}`. The engine turns that
//! answer into one supervised script run:
//!
//! ```text
//! decision  →  resolver  →  environment  →  launcher
//! (parse)      (w<N>)       (WORKFLOW_*)     (<shell> <script>)
//! ```
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`decision`] | Strict then permissive decode of classifier JSON |
//! | [`resolver`] | `w<N>` selectors, position snapshots |
//! | [`environment`] | Argument map → environment variables |
//! | [`launcher`] | Pre-flight checks, spawn, outcome classification |
//! | [`engine`] | The pipeline, plus workflow management |
//! | [`store`] | Ordered workflow list over a key/value blob |
//! | [`catalog`] | Workflow list as shown to the classifier |
//! | [`event_log`] | Per-stage audit trail |
//! | [`config`] | TOML config with env overrides |
//! | [`error`] | Error types with fix suggestions |

pub mod catalog;
pub mod config;
pub mod decision;
pub mod engine;
pub mod environment;
pub mod error;
pub mod event_log;
pub mod launcher;
pub mod resolver;
pub mod store;
pub mod value;
pub mod workflow;

pub use catalog::{Catalog, CatalogEntry};
pub use config::RunbookConfig;
pub use decision::{parse_decision, parse_decision_str, WorkflowDecision};
pub use engine::{status_message, Engine};
pub use environment::{
    EnvironmentBuilder, KeyPolicy, ResolvedEnvironment, ARGS_JSON_VAR, ARG_VAR_PREFIX,
};
pub use error::{FixSuggestion, Result, RunbookError};
pub use event_log::{Event, EventKind, EventLog};
pub use launcher::{is_executable_by_current_user, ExecutionReport, ExecutionStatus, ScriptLauncher};
pub use resolver::{parse_selector, resolve, SelectorSnapshot};
pub use store::{BlobStore, FileBlobStore, MemoryBlobStore, WorkflowStore};
pub use value::{ArgMap, ArgValue};
pub use workflow::Workflow;
