//! sonarcov - SonarQube coverage reports
//!
//! A library for turning per-file coverage data into the SonarQube generic
//! coverage XML format:
//! - Istanbul `coverage.json` and LCOV loading
//! - Per-line branch aggregation
//! - Directory tree summaries
//! - Report writing, synchronous or through tokio

pub mod config;
pub mod coverage;
pub mod report;
pub mod summary;

pub use coverage::{
    branch_coverage_by_line, load_coverage, Collector, CoverageAccessor, FileCoverage,
    LineBranchStats,
};
pub use report::{
    create, write_report_async, FileWriter, MemoryWriter, Report, ReportOptions, ReportOutcome,
    ReportWriter, SonarReport, WriteMode,
};
pub use summary::{summarize_file_coverage, CoverageSummary, Metric, SummaryNode, TreeSummarizer};
