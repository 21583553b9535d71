//! Selector resolution
//!
//! Selectors follow `<prefix><N>`: one non-digit character, then a 1-based
//! position in the workflow list. `w2` is the second workflow.
//!
//! Positions shift whenever the list changes. `SelectorSnapshot` pins the
//! ids that were at each position when the catalog was shown to the
//! classifier, so a stale selector never lands on a different workflow.

use tracing::debug;
use uuid::Uuid;

use crate::decision::WorkflowDecision;
use crate::error::{Result, RunbookError};
use crate::workflow::Workflow;

/// Prefix used when rendering selectors for the classifier
pub const SELECTOR_PREFIX: char = 'w';

/// Render the selector for a zero-based position (`0` → `w1`)
pub fn selector_for(index: usize) -> String {
    format!("{}{}", SELECTOR_PREFIX, index + 1)
}

/// Parse a selector into a zero-based index, without bounds checking
///
/// A suffix too large for `usize` is returned as `usize::MAX` so the
/// bounds check reports it as out of range.
pub fn parse_selector(selector: &str) -> Result<usize> {
    let format_err = |reason: &str| RunbookError::SelectorFormat {
        selector: selector.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = selector.chars();
    let prefix = chars.next().ok_or_else(|| format_err("selector is empty"))?;
    if prefix.is_ascii_digit() {
        return Err(format_err("missing prefix character"));
    }

    let suffix = chars.as_str();
    if suffix.is_empty() {
        return Err(format_err("missing index after prefix"));
    }
    if !suffix.chars().all(|c| c.is_ascii_digit()) {
        return Err(format_err("index must be a positive integer"));
    }
    if suffix.chars().all(|c| c == '0') {
        return Err(format_err("index starts at 1"));
    }

    let n = suffix.parse::<usize>().unwrap_or(usize::MAX);
    Ok(n - 1)
}

fn check_bounds(selector: &str, index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(RunbookError::IndexOutOfRange {
            selector: selector.to_string(),
            index,
            len,
        });
    }
    Ok(())
}

/// Resolve a decision against the live list
pub fn resolve(decision: &WorkflowDecision, workflows: &[Workflow]) -> Result<Workflow> {
    let index = parse_selector(&decision.workflow_id)?;
    check_bounds(&decision.workflow_id, index, workflows.len())?;
    Ok(workflows[index].clone())
}

/// Workflow ids by position, captured when the catalog was generated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSnapshot {
    ids: Vec<Uuid>,
}

impl SelectorSnapshot {
    pub fn new(ids: Vec<Uuid>) -> Self {
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.ids
    }

    /// Map a selector to the workflow id it meant at snapshot time
    pub fn resolve(&self, selector: &str) -> Result<Uuid> {
        let index = parse_selector(selector)?;
        check_bounds(selector, index, self.ids.len())?;
        let id = self.ids[index];
        debug!(selector, index, %id, "selector resolved");
        Ok(id)
    }
}
