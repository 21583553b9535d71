//! Classifier-facing workflow catalog
//!
//! The classifier only ever sees selectors (`w1`, `w2`, ...), never ids.
//! A catalog carries the `SelectorSnapshot` it was rendered from so the
//! decision that comes back can be resolved against the same positions.

use serde::Serialize;

use crate::resolver::{selector_for, SelectorSnapshot};
use crate::workflow::Workflow;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub selector: String,
    pub name: String,
    pub prompt: String,
    pub output_schema: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    snapshot: SelectorSnapshot,
}

impl Catalog {
    pub fn from_workflows(workflows: &[Workflow]) -> Self {
        let entries = workflows
            .iter()
            .enumerate()
            .map(|(i, wf)| CatalogEntry {
                selector: selector_for(i),
                name: wf.name.clone(),
                prompt: wf.prompt.clone(),
                output_schema: wf.output_schema.clone(),
            })
            .collect();
        let snapshot = SelectorSnapshot::new(workflows.iter().map(|wf| wf.id).collect());
        Self { entries, snapshot }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn snapshot(&self) -> &SelectorSnapshot {
        &self.snapshot
    }

    /// Pretty JSON array for inclusion in a classifier prompt
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.entries).unwrap_or_else(|_| "[]".to_string())
    }
}
