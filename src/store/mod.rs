//! Store Module - workflow persistence
//!
//! Key types:
//! - `WorkflowStore`: ordered workflow list, rewritten in full on mutation
//! - `BlobStore`: key/value blob interface the list is saved through
//! - `FileBlobStore` / `MemoryBlobStore`: the two blob backends

mod blob;
mod workflows;

pub use blob::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use workflows::{WorkflowStore, WORKFLOWS_KEY};
