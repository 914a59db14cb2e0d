//! Report module
//!
//! Provides:
//! - The `Report` capability shared by report types
//! - The SonarQube generic coverage report
//! - Report writers (filesystem, in-memory, async)

mod sonar;
mod writer;

pub use sonar::*;
pub use writer::*;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::coverage::CoverageAccessor;

/// Default settings a report type falls back to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDefaults {
    pub file: &'static str,
}

/// Caller-supplied report settings; unset fields use the report defaults
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Output directory (default: project root)
    pub dir: Option<PathBuf>,
    /// Output file name
    pub file: Option<String>,
    /// Root that file paths are made relative to (default: working directory)
    pub project_root: Option<PathBuf>,
}

/// Returned once the report has been fully written and closed
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub path: PathBuf,
    /// Number of `<file>` blocks written
    pub files: usize,
    /// Number of line elements written
    pub lines: usize,
    pub generated_at: DateTime<Utc>,
}

/// A coverage report type
pub trait Report {
    fn synopsis(&self) -> &'static str;

    fn default_config(&self) -> ReportDefaults;

    /// Where the report will be written
    fn output_path(&self) -> PathBuf;

    /// Render the report for every file in `accessor` through `writer`
    fn write_report(
        &self,
        accessor: &dyn CoverageAccessor,
        writer: &mut dyn ReportWriter,
    ) -> Result<ReportOutcome>;

    /// Write the report to disk with the default file writer
    fn generate(&self, accessor: &dyn CoverageAccessor) -> Result<ReportOutcome> {
        self.write_report(accessor, &mut FileWriter::new())
    }
}

/// Build a report by type name
pub fn create(kind: &str, options: ReportOptions) -> Result<Box<dyn Report>> {
    match kind.to_lowercase().as_str() {
        SonarReport::TYPE | "sonar" => Ok(Box::new(SonarReport::new(options))),
        _ => anyhow::bail!("Unknown report type: {}. Supported: {}", kind, SonarReport::TYPE),
    }
}

/// Render `report` in memory, then write it with tokio.
///
/// The future resolves once, after the file has been written.
pub async fn write_report_async(
    report: &dyn Report,
    accessor: &dyn CoverageAccessor,
) -> Result<ReportOutcome> {
    let mut memory = MemoryWriter::new();
    let outcome = report.write_report(accessor, &mut memory)?;
    let content = memory
        .contents(&outcome.path)
        .context("Report produced no output")?
        .to_string();

    if let Some(parent) = outcome.path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    tokio::fs::write(&outcome.path, content)
        .await
        .with_context(|| format!("Failed to write report: {}", outcome.path.display()))?;

    Ok(ReportOutcome {
        generated_at: Utc::now(),
        ..outcome
    })
}
