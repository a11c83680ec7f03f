//! Table writer module
//!
//! [`TableWriter::upload_tables`] ties everything together:
//!
//! 1. [`Reconciler`] pairs sources with mapping entries and manifests
//! 2. destinations are moved into the session's branch
//! 3. [`TableUploader`] prepares buckets and tables and stages data
//! 4. the resulting [`LoadTableQueue`](crate::queue::LoadTableQueue) is started

mod reconcile;
mod system;
mod table_writer;
mod uploader;

pub use reconcile::{PlannedTable, Reconciler};
pub use system::{
    SystemMetadata, CREATED_BY_BRANCH_ID, CREATED_BY_COMPONENT_ID, CREATED_BY_CONFIGURATION_ID,
    CREATED_BY_CONFIGURATION_ROW_ID, LAST_UPDATED_BY_BRANCH_ID, LAST_UPDATED_BY_COMPONENT_ID,
    LAST_UPDATED_BY_CONFIGURATION_ID, LAST_UPDATED_BY_CONFIGURATION_ROW_ID, SYSTEM_PROVIDER,
};
pub use table_writer::TableWriter;
pub use uploader::TableUploader;
