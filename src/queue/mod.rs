//! Load queue module
//!
//! A [`LoadTableTask`] is one deferred table import plus the metadata writes
//! that follow it. [`LoadTableQueue`] submits tasks in discovery order and
//! waits for them in the same order.

mod runner;
mod types;

pub use runner::LoadTableQueue;
pub use types::{LoadTableTask, MetadataDefinition, TaskState};
