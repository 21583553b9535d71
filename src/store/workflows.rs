//! WorkflowStore - ordered workflow collection
//!
//! Position in the list is what selectors address, so order is part of
//! the stored state. Every mutation rewrites the whole list.

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, RunbookError};
use crate::resolver::SelectorSnapshot;
use crate::workflow::Workflow;

use super::blob::BlobStore;

/// Storage key of the serialized workflow list
pub const WORKFLOWS_KEY: &str = "workflows";

/// Ordered, persisted workflow list (single-threaded access)
#[derive(Debug)]
pub struct WorkflowStore<B: BlobStore> {
    blob: B,
    workflows: Vec<Workflow>,
}

impl<B: BlobStore> WorkflowStore<B> {
    /// Load the list from `blob` (empty if never saved)
    pub fn open(blob: B) -> Result<Self> {
        let workflows = match blob.load(WORKFLOWS_KEY)? {
            Some(bytes) => {
                serde_json::from_slice::<Vec<Workflow>>(&bytes).map_err(|e| {
                    RunbookError::StoreCorrupt {
                        key: WORKFLOWS_KEY.to_string(),
                        details: e.to_string(),
                    }
                })?
            }
            None => Vec::new(),
        };
        debug!(count = workflows.len(), "workflow store opened");
        Ok(Self { blob, workflows })
    }

    /// Append a workflow; returns its id
    pub fn add(&mut self, workflow: Workflow) -> Result<Uuid> {
        workflow.validate()?;
        if self.position(workflow.id).is_some() {
            return Err(RunbookError::InvalidWorkflow {
                reason: format!("workflow {} already exists", workflow.id),
            });
        }
        let id = workflow.id;
        info!(%id, name = %workflow.name, "adding workflow");
        let mut next = self.workflows.clone();
        next.push(workflow);
        self.commit(next)?;
        Ok(id)
    }

    /// Replace the entry with the same id; `false` if the id is unknown
    pub fn update(&mut self, workflow: Workflow) -> Result<bool> {
        workflow.validate()?;
        let Some(pos) = self.position(workflow.id) else {
            debug!(id = %workflow.id, "update of unknown workflow ignored");
            return Ok(false);
        };
        info!(id = %workflow.id, name = %workflow.name, "updating workflow");
        let mut next = self.workflows.clone();
        next[pos] = workflow;
        self.commit(next)?;
        Ok(true)
    }

    /// Remove the entry with `id`; `false` if absent
    pub fn delete(&mut self, id: Uuid) -> Result<bool> {
        let Some(pos) = self.position(id) else {
            debug!(%id, "delete of unknown workflow ignored");
            return Ok(false);
        };
        let mut next = self.workflows.clone();
        let removed = next.remove(pos);
        self.commit(next)?;
        info!(%id, name = %removed.name, "deleted workflow");
        Ok(true)
    }

    pub fn get(&self, id: Uuid) -> Option<Workflow> {
        self.workflows.iter().find(|w| w.id == id).cloned()
    }

    /// Copy of the current ordered list
    pub fn list(&self) -> Vec<Workflow> {
        self.workflows.clone()
    }

    /// Borrowed view of the current order
    pub fn as_slice(&self) -> &[Workflow] {
        &self.workflows
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// Capture the current positions for later selector resolution
    pub fn snapshot(&self) -> SelectorSnapshot {
        SelectorSnapshot::new(self.workflows.iter().map(|w| w.id).collect())
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.workflows.iter().position(|w| w.id == id)
    }

    /// Save `next`, then make it the current list; on a failed save the
    /// current list is left untouched
    fn commit(&mut self, next: Vec<Workflow>) -> Result<()> {
        let bytes = serde_json::to_vec(&next)?;
        self.blob.save(WORKFLOWS_KEY, &bytes)?;
        self.workflows = next;
        Ok(())
    }
}
