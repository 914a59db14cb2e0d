//! Per-line branch aggregation

use std::collections::BTreeMap;

use super::FileCoverage;

/// Branch outcomes pooled for one source line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineBranchStats {
    pub covered: u32,
    pub total: u32,
    pub coverage: f64,
}

/// Pool every branch outcome by the line its branch belongs to.
///
/// Lines without branches have no entry. Branch ids with no hit counts are
/// skipped.
pub fn branch_coverage_by_line(coverage: &FileCoverage) -> BTreeMap<u32, LineBranchStats> {
    let mut pooled: BTreeMap<u32, Vec<u64>> = BTreeMap::new();

    for (id, mapping) in &coverage.branch_map {
        if let Some(hits) = coverage.branch_hits.get(id) {
            pooled.entry(mapping.line).or_default().extend(hits);
        }
    }

    pooled
        .into_iter()
        .filter(|(_, hits)| !hits.is_empty())
        .map(|(line, hits)| {
            let covered = hits.iter().filter(|&&h| h > 0).count() as u32;
            let total = hits.len() as u32;
            let stats = LineBranchStats {
                covered,
                total,
                coverage: (covered as f64 / total as f64) * 100.0,
            };
            (line, stats)
        })
        .collect()
}
