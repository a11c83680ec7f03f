//! Destination resolver

use crate::error::Result;
use crate::types::TableId;

/// Destination for a file: `{prefix}.{name}` or just `{name}`, with one
/// trailing `.csv` stripped from the file name
pub fn resolve(prefix: Option<&str>, filename: &str) -> String {
    let name = filename.strip_suffix(".csv").unwrap_or(filename);
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}.{name}"),
        _ => name.to_string(),
    }
}

/// Move a destination into a development branch bucket
///
/// `out.c-foo.table` and `out.foo.table` both become `out.c-{branch}-foo.table`,
/// matching the id the backend gives a bucket created under that name.
/// No-op without a branch.
pub fn rewrite_destination(destination: &str, branch_id: Option<&str>) -> Result<String> {
    let Some(branch_id) = branch_id else {
        return Ok(destination.to_string());
    };

    let id = TableId::parse(destination)?;
    let bucket = format!("c-{branch_id}-{}", id.bucket_name());
    Ok(id.with_bucket_segment(bucket).to_string())
}
