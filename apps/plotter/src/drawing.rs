//! Loads already-flattened drawings from disk.

use std::path::Path;

use anyhow::Context;
use shared::domain::Polyline;

/// Reads a JSON array of `{"points": [[x, y], ...]}` objects.
pub async fn load_polylines(path: &Path) -> anyhow::Result<Vec<Polyline>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read drawing '{}'", path.display()))?;
    parse_polylines(&raw).with_context(|| format!("invalid drawing '{}'", path.display()))
}

pub fn parse_polylines(raw: &str) -> anyhow::Result<Vec<Polyline>> {
    Ok(serde_json::from_str(raw)?)
}
