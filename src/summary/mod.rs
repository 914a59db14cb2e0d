//! Coverage summaries
//!
//! Per-file metrics and the directory tree that aggregates them.

mod tree;

pub use tree::*;

use serde::Serialize;

use crate::coverage::FileCoverage;

/// Totals for one kind of coverable item
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metric {
    pub total: u32,
    pub covered: u32,
    pub skipped: u32,
    pub pct: f64,
}

impl Default for Metric {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl Metric {
    pub fn new(total: u32, covered: u32, skipped: u32) -> Self {
        Self {
            total,
            covered,
            skipped,
            pct: percent(covered, total),
        }
    }

    fn merge(&mut self, other: &Metric) {
        *self = Metric::new(
            self.total + other.total,
            self.covered + other.covered,
            self.skipped + other.skipped,
        );
    }
}

/// Percentage truncated to two decimals; nothing to cover counts as 100%
fn percent(covered: u32, total: u32) -> f64 {
    if total == 0 {
        return 100.0;
    }
    ((1000.0 * 100.0 * covered as f64 / total as f64 + 5.0) / 10.0).floor() / 100.0
}

/// Line, statement, function and branch metrics for a file or a directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CoverageSummary {
    pub lines: Metric,
    pub statements: Metric,
    pub functions: Metric,
    pub branches: Metric,
}

impl CoverageSummary {
    pub fn merge(&mut self, other: &CoverageSummary) {
        self.lines.merge(&other.lines);
        self.statements.merge(&other.statements);
        self.functions.merge(&other.functions);
        self.branches.merge(&other.branches);
    }
}

/// Summarize one file, counting ignored code as covered
pub fn summarize_file_coverage(coverage: &FileCoverage) -> CoverageSummary {
    let coverage = coverage.with_ignored_totals();

    let lines = Metric::new(
        coverage.lines.len() as u32,
        coverage.lines.values().filter(|&&h| h > 0).count() as u32,
        0,
    );

    let statements = Metric::new(
        coverage.statements.len() as u32,
        coverage.statements.values().filter(|&&h| h > 0).count() as u32,
        coverage
            .statements
            .keys()
            .filter(|id| coverage.statement_map.get(*id).is_some_and(|l| l.skip))
            .count() as u32,
    );

    let functions = Metric::new(
        coverage.functions.len() as u32,
        coverage.functions.values().filter(|&&h| h > 0).count() as u32,
        coverage
            .functions
            .keys()
            .filter(|id| coverage.fn_map.get(*id).is_some_and(|f| f.skip))
            .count() as u32,
    );

    let mut branches = (0u32, 0u32, 0u32);
    for (id, hits) in &coverage.branch_hits {
        let locations = coverage
            .branch_map
            .get(id)
            .map(|m| m.locations.as_slice())
            .unwrap_or_default();

        for (index, hit) in hits.iter().enumerate() {
            branches.0 += 1;
            if *hit > 0 {
                branches.1 += 1;
            }
            if locations.get(index).is_some_and(|l| l.skip) {
                branches.2 += 1;
            }
        }
    }

    CoverageSummary {
        lines,
        statements,
        functions,
        branches: Metric::new(branches.0, branches.1, branches.2),
    }
}
