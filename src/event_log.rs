//! Invocation audit trail
//!
//! - Event: envelope with id + invocation number + timestamp + kind
//! - EventKind: one variant per pipeline stage outcome
//! - EventLog: thread-safe, append-only log shared by clones

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Invocation this event belongs to
    pub invocation: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    DecisionParsed {
        selector: String,
        args: Value,
    },
    WorkflowResolved {
        selector: String,
        workflow_id: Arc<str>,
        workflow_name: String,
    },
    EnvironmentBuilt {
        workflow_id: Arc<str>,
        /// Variable names only; values may carry user data
        variables: Vec<String>,
    },
    ScriptStarted {
        workflow_id: Arc<str>,
        shell: String,
        script: String,
    },
    ScriptCompleted {
        workflow_id: Arc<str>,
        exit_code: i32,
        warnings: bool,
        duration_ms: u64,
    },
    InvocationFailed {
        stage: String,
        error: String,
    },
}

impl EventKind {
    /// Extract workflow_id if the event is tied to a resolved workflow
    pub fn workflow_id(&self) -> Option<&str> {
        match self {
            Self::WorkflowResolved { workflow_id, .. }
            | Self::EnvironmentBuilt { workflow_id, .. }
            | Self::ScriptStarted { workflow_id, .. }
            | Self::ScriptCompleted { workflow_id, .. } => Some(workflow_id),
            Self::DecisionParsed { .. } | Self::InvocationFailed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ScriptCompleted { .. } | Self::InvocationFailed { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
    invocation: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
            invocation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start a new invocation; later events carry the returned number
    pub fn begin_invocation(&self) -> u64 {
        self.invocation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Emit an event (returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            invocation: self.invocation.load(Ordering::SeqCst),
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Events of one invocation
    pub fn invocation_events(&self, invocation: u64) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.invocation == invocation)
            .cloned()
            .collect()
    }

    /// Events of the most recent invocation
    pub fn latest(&self) -> Vec<Event> {
        self.invocation_events(self.invocation.load(Ordering::SeqCst))
    }

    /// Serialize to JSON for debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}
