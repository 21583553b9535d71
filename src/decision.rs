//! Classifier response parsing
//!
//! A decision is `{"workflow_id": "w<N>", "workflow_args": {...}}`.
//! Decoding runs two passes: a strict typed decode, then a permissive
//! decode through `serde_json::Value` that tolerates extra fields and
//! awkward numbers. Only when both fail is the response rejected.

use serde::Deserialize;
use serde_json::error::Category;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, RunbookError};
use crate::value::{strict_object, ArgMap, ArgValue};

/// Parsed classifier output
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDecision {
    /// Selector string, e.g. `w2`
    pub workflow_id: String,
    pub workflow_args: ArgMap,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictDecision {
    workflow_id: String,
    #[serde(deserialize_with = "strict_object")]
    workflow_args: ArgMap,
}

impl From<StrictDecision> for WorkflowDecision {
    fn from(raw: StrictDecision) -> Self {
        Self {
            workflow_id: raw.workflow_id,
            workflow_args: raw.workflow_args,
        }
    }
}

/// Parse raw classifier bytes
pub fn parse_decision(raw: &[u8]) -> Result<WorkflowDecision> {
    let text = std::str::from_utf8(raw).map_err(|e| RunbookError::InvalidEncoding {
        details: e.to_string(),
    })?;
    parse_decision_str(text)
}

/// Parse classifier text
pub fn parse_decision_str(text: &str) -> Result<WorkflowDecision> {
    let strict_err = match serde_json::from_str::<StrictDecision>(text) {
        Ok(decision) => {
            debug!(workflow_id = %decision.workflow_id, "strict decode succeeded");
            return Ok(decision.into());
        }
        Err(e) => e,
    };
    debug!(error = %strict_err, "strict decode failed, trying permissive decode");

    let value: Value = serde_json::from_str(text).map_err(|e| match e.classify() {
        Category::Data => RunbookError::DecisionSchema {
            details: e.to_string(),
        },
        _ if exceeds_depth(&e) => RunbookError::DecisionSchema {
            details: format!(
                "nesting deeper than {} levels is not supported ({})",
                MAX_DEPTH, e
            ),
        },
        _ => RunbookError::DecisionSyntax {
            details: e.to_string(),
        },
    })?;

    let decision = permissive(value).map_err(|details| RunbookError::DecisionSchema { details })?;
    debug!(workflow_id = %decision.workflow_id, "permissive decode succeeded");
    Ok(decision)
}

/// serde_json's recursion limit for nested arrays and objects
pub const MAX_DEPTH: usize = 128;

/// Well-formed input nested past `MAX_DEPTH`; serde_json reports it as a
/// syntax error and exposes no dedicated category
fn exceeds_depth(e: &serde_json::Error) -> bool {
    e.to_string().contains("recursion limit exceeded")
}

fn permissive(value: Value) -> std::result::Result<WorkflowDecision, String> {
    let mut obj = match value {
        Value::Object(obj) => obj,
        other => return Err(format!("expected a JSON object, got {}", json_type(&other))),
    };

    let workflow_id = match obj.remove("workflow_id") {
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(format!(
                "'workflow_id' must be a string, got {}",
                json_type(&other)
            ))
        }
        None => return Err("missing 'workflow_id'".to_string()),
    };

    let workflow_args = match obj.remove("workflow_args") {
        Some(Value::Object(args)) => loose_args(args),
        Some(other) => {
            return Err(format!(
                "'workflow_args' must be an object, got {}",
                json_type(&other)
            ))
        }
        None => return Err("missing 'workflow_args'".to_string()),
    };

    Ok(WorkflowDecision {
        workflow_id,
        workflow_args,
    })
}

fn loose_args(args: Map<String, Value>) -> ArgMap {
    args.into_iter()
        .map(|(k, v)| (k, ArgValue::from(v)))
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
