//! Config file loading.

use anyhow::{bail, Context, Result};
use living_core::Config;
use std::path::Path;

/// Load a run configuration from YAML (`.yaml`, `.yml`) or JSON (`.json`).
///
/// Missing sections fall back to their defaults. Value checks are left to
/// the engine so an invalid config still produces an aborted run record.
pub fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let config = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&text)
            .with_context(|| format!("invalid YAML config: {}", path.display()))?,
        "json" => serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON config: {}", path.display()))?,
        other => bail!(
            "unsupported config extension '{other}' for {} (expected yaml, yml or json)",
            path.display()
        ),
    };
    Ok(config)
}
