pub mod probe;
pub mod run;

use anyhow::{Context, Result};
use std::path::Path;

use siphon::config::Config;
use siphon::models::JobSpec;

// Re-export command functions for convenience
pub use probe::probe;
pub use run::{run, validate};

/// Load configuration from a TOML file, or the environment when none is given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

/// Read one job spec or an array of them
pub fn load_jobs(path: &Path) -> Result<Vec<JobSpec>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read jobs file: {}", path.display()))?;

    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse jobs file: {}", path.display()))?;

    let specs = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(specs)
}
