//! Workflow definition
//!
//! A workflow pairs a natural-language instruction with an expected
//! output shape and a local script. The `id` is assigned once and never
//! changes; everything else can be replaced by an update.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RunbookError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub prompt: String,
    /// Advisory description of the classifier's structured output
    #[serde(default)]
    pub output_schema: String,
    /// Empty means "not configured yet"
    #[serde(default)]
    pub script_path: PathBuf,
}

impl Workflow {
    /// Create a workflow with a fresh id
    pub fn new(
        name: impl Into<String>,
        prompt: impl Into<String>,
        output_schema: impl Into<String>,
        script_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            prompt: prompt.into(),
            output_schema: output_schema.into(),
            script_path: script_path.into(),
        }
    }

    /// Script path, or `None` when not configured
    pub fn script(&self) -> Option<&Path> {
        if self.script_path.as_os_str().is_empty() {
            None
        } else {
            Some(&self.script_path)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RunbookError::InvalidWorkflow {
                reason: format!("workflow {} has an empty name", self.id),
            });
        }
        Ok(())
    }
}
