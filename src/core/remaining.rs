//! Calls still waiting to be ingested.
//!
//! Diffs input collections against the output collections by `CallSid`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::fs;
use tracing::{info, warn};

use super::collection::{read_collection, CollectionPaths};

fn call_sid(row: &Value) -> Option<&str> {
    row.get("CallSid").and_then(|v| v.as_str())
}

/// CallSids with a terminal outcome (dual, mono or no recording).
///
/// Collections that do not exist yet contribute nothing.
pub async fn recorded_call_sids(collections: &CollectionPaths) -> Result<HashSet<String>> {
    let mut ids = HashSet::new();

    for path in [&collections.dual, &collections.mono, &collections.no_recording] {
        if !path.exists() {
            warn!(path = %path.display(), "Collection not found, treating as empty");
            continue;
        }
        let rows = read_collection(path)
            .await
            .with_context(|| format!("Failed to read collection {}", path.display()))?;
        ids.extend(rows.iter().filter_map(call_sid).map(str::to_string));
    }

    Ok(ids)
}

/// Records from `inputs` whose CallSid is not in `recorded`, in input order
pub async fn remaining_records(inputs: &[PathBuf], recorded: &HashSet<String>) -> Result<Vec<Value>> {
    let mut remaining = Vec::new();

    for input in inputs {
        let content = fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read {}", input.display()))?;
        let rows: Vec<Value> = serde_json::from_str(&content)
            .with_context(|| format!("{} is not a JSON array", input.display()))?;

        let before = remaining.len();
        remaining.extend(
            rows.into_iter()
                .filter(|row| call_sid(row).is_some_and(|sid| !recorded.contains(sid))),
        );
        info!(path = %input.display(), remaining = remaining.len() - before, "Diffed input");
    }

    Ok(remaining)
}

/// Write records as a pretty-printed JSON array
pub async fn write_records(path: &Path, records: &[Value]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
