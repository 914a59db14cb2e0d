//! Coverage module
//!
//! Provides:
//! - The per-file coverage model (Istanbul field names)
//! - Istanbul JSON and LCOV loading
//! - Per-line branch aggregation

mod branches;
mod istanbul;
mod lcov;

pub use branches::*;
pub use istanbul::*;
pub use lcov::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A position inside a source file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

/// A source range, optionally excluded from coverage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub start: Position,
    #[serde(default)]
    pub end: Position,
    /// Marked with an ignore hint by the instrumenter
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip: bool,
}

/// Function metadata from `fnMap`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMapping {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub loc: Location,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip: bool,
}

/// Branch metadata from `branchMap`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchMapping {
    /// Source line the branch belongs to
    #[serde(default)]
    pub line: u32,
    /// Whole construct; newer collectors record this instead of `line`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<Location>,
    /// Branch construct (`if`, `cond-expr`, `switch`, ...)
    #[serde(rename = "type", default)]
    pub kind: String,
    /// One location per outcome
    #[serde(default)]
    pub locations: Vec<Location>,
}

/// Coverage record for a single source file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileCoverage {
    #[serde(default)]
    pub path: String,
    /// Line number -> hit count
    #[serde(rename = "l", default)]
    pub lines: BTreeMap<u32, u64>,
    #[serde(rename = "statementMap", default)]
    pub statement_map: BTreeMap<String, Location>,
    #[serde(rename = "s", default)]
    pub statements: BTreeMap<String, u64>,
    #[serde(rename = "fnMap", default)]
    pub fn_map: BTreeMap<String, FunctionMapping>,
    #[serde(rename = "f", default)]
    pub functions: BTreeMap<String, u64>,
    #[serde(rename = "branchMap", default)]
    pub branch_map: BTreeMap<String, BranchMapping>,
    /// Branch id -> one hit count per outcome
    #[serde(rename = "b", default)]
    pub branch_hits: BTreeMap<String, Vec<u64>>,
}

impl FileCoverage {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Fill in what older or newer collectors leave out.
    ///
    /// Branches without a line take it from their `loc` or first location.
    /// When `lines` is missing it is derived from the statement hits: a line
    /// takes the highest hit count of the statements starting on it, with
    /// skipped statements counted as hit once.
    pub fn with_derived_info(mut self) -> Self {
        for mapping in self.branch_map.values_mut() {
            if mapping.line == 0 {
                mapping.line = mapping
                    .loc
                    .as_ref()
                    .or(mapping.locations.first())
                    .map(|l| l.start.line)
                    .unwrap_or(0);
            }
        }

        if !self.lines.is_empty() {
            return self;
        }

        for (id, &count) in &self.statements {
            let Some(location) = self.statement_map.get(id) else {
                continue;
            };
            // Ignored statements count as hit
            let count = if count == 0 && location.skip { 1 } else { count };
            let entry = self.lines.entry(location.start.line).or_insert(count);
            if *entry < count {
                *entry = count;
            }
        }

        self
    }

    /// Copy of this record where ignored code counts as covered.
    ///
    /// Skipped statements, functions and branch outcomes with zero hits are
    /// bumped to one hit.
    pub fn with_ignored_totals(&self) -> Self {
        let mut coverage = self.clone();

        for (id, location) in &self.statement_map {
            if let Some(hits) = coverage.statements.get_mut(id) {
                if *hits == 0 && location.skip {
                    *hits = 1;
                }
            }
        }

        for (id, mapping) in &self.fn_map {
            if let Some(hits) = coverage.functions.get_mut(id) {
                if *hits == 0 && mapping.skip {
                    *hits = 1;
                }
            }
        }

        for (id, mapping) in &self.branch_map {
            if let Some(hits) = coverage.branch_hits.get_mut(id) {
                for (hit, location) in hits.iter_mut().zip(&mapping.locations) {
                    if *hit == 0 && location.skip {
                        *hit = 1;
                    }
                }
            }
        }

        coverage
    }

    /// Branch ids that appear in only one of `branchMap` and `b`
    pub fn inconsistent_branches(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .branch_map
            .keys()
            .filter(|id| !self.branch_hits.contains_key(*id))
            .chain(
                self.branch_hits
                    .keys()
                    .filter(|id| !self.branch_map.contains_key(*id)),
            )
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

/// Read access to a set of per-file coverage records
pub trait CoverageAccessor {
    /// File keys, in a deterministic order
    fn files(&self) -> Vec<String>;

    /// Coverage record registered under `key`
    fn file_coverage_for(&self, key: &str) -> Option<&FileCoverage>;
}

/// Coverage records keyed by file path
#[derive(Debug, Clone, Default)]
pub struct Collector {
    files: BTreeMap<String, FileCoverage>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record, replacing any previous one under the same key
    pub fn add(&mut self, key: impl Into<String>, coverage: FileCoverage) {
        self.files.insert(key.into(), coverage);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// `(file key, branch ids)` for every record whose branch maps disagree
    pub fn inconsistencies(&self) -> Vec<(String, Vec<String>)> {
        self.files
            .iter()
            .filter_map(|(key, coverage)| {
                let ids = coverage.inconsistent_branches();
                if ids.is_empty() {
                    None
                } else {
                    Some((key.clone(), ids))
                }
            })
            .collect()
    }
}

impl CoverageAccessor for Collector {
    fn files(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn file_coverage_for(&self, key: &str) -> Option<&FileCoverage> {
        self.files.get(key)
    }
}

/// Load coverage from a file based on format
pub fn load_coverage(path: &std::path::Path, format: &str) -> anyhow::Result<Collector> {
    match format.to_lowercase().as_str() {
        "istanbul" | "json" => load_istanbul_json(path),
        "lcov" => load_lcov(path),
        _ => anyhow::bail!("Unknown coverage format: {}. Supported: istanbul, lcov", format),
    }
}
