//! Istanbul `coverage.json` loader

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::{Collector, FileCoverage};

/// Load an Istanbul coverage file
pub fn load_istanbul_json(path: &Path) -> Result<Collector> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read coverage file: {}", path.display()))?;
    parse_istanbul_json(&content)
        .with_context(|| format!("Failed to parse coverage file: {}", path.display()))
}

/// Parse Istanbul coverage JSON: an object of file key -> file coverage
pub fn parse_istanbul_json(content: &str) -> Result<Collector> {
    let files: BTreeMap<String, FileCoverage> =
        serde_json::from_str(content).context("Invalid Istanbul coverage JSON")?;

    let mut collector = Collector::new();
    for (key, mut coverage) in files {
        if coverage.path.is_empty() {
            coverage.path = key.clone();
        }
        collector.add(key, coverage.with_derived_info());
    }

    Ok(collector)
}
