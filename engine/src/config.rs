//! YAML configuration loading.
//!
//! A configuration file declares a list of processes. Parsing and
//! validation are all-or-nothing per file: one bad entry rejects the
//! whole file. Directory loading walks files in name order and keeps
//! going past bad files.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::domain::{CreateProcessCommand, DomainError, Result};

#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    pub processes: Vec<CreateProcessCommand>,
}

/// Parse one configuration file into creation commands.
pub fn parse_config_file(path: &Path) -> Result<Vec<CreateProcessCommand>> {
    let contents = std::fs::read_to_string(path).map_err(|e| DomainError::ConfigError {
        file: path.display().to_string(),
        line: 0,
        message: format!("failed to read file: {e}"),
    })?;
    let config: ConfigFile = serde_yaml::from_str(&contents)
        .map_err(|e| DomainError::config(&path.display().to_string(), &e))?;
    debug!(
        file = %path.display(),
        processes = config.processes.len(),
        "parsed configuration file"
    );
    Ok(config.processes)
}

/// Configuration files in a directory, sorted by file name for a
/// deterministic load order. Only `.yaml` and `.yml` files count.
pub fn config_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| DomainError::ConfigError {
        file: dir.display().to_string(),
        line: 0,
        message: format!("failed to read directory: {e}"),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml" | "yml")
                )
        })
        .collect();
    files.sort();
    Ok(files)
}
