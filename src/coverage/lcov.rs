//! LCOV tracefile loader

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::{BranchMapping, Collector, FileCoverage};

/// Load an LCOV file
pub fn load_lcov(path: &Path) -> Result<Collector> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read LCOV file: {}", path.display()))?;
    parse_lcov_string(&content)
}

/// Parse LCOV content from a string
///
/// `DA` records become line hits and every `BRDA` block becomes one branch
/// id (`<line>:<block>`) whose outcomes are the block's branches.
pub fn parse_lcov_string(content: &str) -> Result<Collector> {
    let mut collector = Collector::new();
    let mut current: Option<FileCoverage> = None;

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();

        if let Some(path) = line.strip_prefix("SF:") {
            // Source file start
            if let Some(file) = current.take() {
                collector.add(file.path.clone(), file);
            }
            current = Some(FileCoverage::new(path));
        } else if let Some(record) = line.strip_prefix("DA:") {
            // Line hits: DA:<line>,<hits>[,<checksum>]
            if let Some(ref mut file) = current {
                let mut fields = record.split(',');
                let line_number = parse_line_number(fields.next(), index)?;
                let hits = parse_field(fields.next(), index)?;
                file.lines.insert(line_number, hits);
            }
        } else if let Some(record) = line.strip_prefix("BRDA:") {
            // Branch outcome: BRDA:<line>,<block>,<branch>,<taken>
            if let Some(ref mut file) = current {
                let fields: Vec<&str> = record.split(',').collect();
                if fields.len() < 4 {
                    anyhow::bail!("Malformed BRDA record on line {}: {}", index + 1, line);
                }
                let line_number = parse_line_number(Some(fields[0]), index)?;
                let taken = match fields[3] {
                    "-" => 0,
                    value => parse_field(Some(value), index)?,
                };

                let id = format!("{}:{}", line_number, fields[1]);
                file.branch_map
                    .entry(id.clone())
                    .or_insert_with(|| BranchMapping {
                        line: line_number,
                        loc: None,
                        kind: "lcov".to_string(),
                        locations: Vec::new(),
                    });
                file.branch_hits.entry(id).or_default().push(taken);
            }
        } else if line == "end_of_record" {
            if let Some(file) = current.take() {
                collector.add(file.path.clone(), file);
            }
        }
    }

    // Tolerate a missing trailing end_of_record
    if let Some(file) = current.take() {
        collector.add(file.path.clone(), file);
    }

    Ok(collector)
}

fn parse_field(field: Option<&str>, index: usize) -> Result<u64> {
    let field = field.with_context(|| format!("Missing field on line {}", index + 1))?;
    field
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Invalid number '{}' on line {}", field, index + 1))
}

fn parse_line_number(field: Option<&str>, index: usize) -> Result<u32> {
    let value = parse_field(field, index)?;
    u32::try_from(value)
        .with_context(|| format!("Line number {} out of range on line {}", value, index + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{branch_coverage_by_line, CoverageAccessor};

    #[test]
    fn test_parse_lcov() {
        let lcov = r#"
TN:
SF:src/main.rs
FN:1,main
FNDA:1,main
FNF:1
FNH:1
DA:1,1
DA:2,1
DA:3,0
BRDA:2,0,0,1
BRDA:2,0,1,-
BRDA:2,1,0,3
LF:3
LH:2
BRF:3
BRH:2
end_of_record
SF:src/lib.rs
DA:1,1
DA:2,1
LF:2
LH:2
end_of_record
"#;

        let collector = parse_lcov_string(lcov).unwrap();

        assert_eq!(collector.len(), 2);
        let main = collector.file_coverage_for("src/main.rs").unwrap();
        assert_eq!(main.lines.len(), 3);
        assert_eq!(main.lines[&3], 0);
        assert_eq!(main.branch_hits["2:0"], vec![1, 0]);
        assert_eq!(main.branch_hits["2:1"], vec![3]);

        let stats = branch_coverage_by_line(main);
        assert_eq!(stats[&2].total, 3);
        assert_eq!(stats[&2].covered, 2);
    }

    #[test]
    fn test_missing_end_of_record() {
        let collector = parse_lcov_string("SF:a.rs\nDA:1,0\n").unwrap();
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_malformed_record() {
        assert!(parse_lcov_string("SF:a.rs\nDA:x,1\nend_of_record\n").is_err());
        assert!(parse_lcov_string("SF:a.rs\nBRDA:1,0\nend_of_record\n").is_err());
    }

    #[test]
    fn test_line_number_out_of_range() {
        assert!(parse_lcov_string("SF:a.rs\nDA:4294967297,1\nend_of_record\n").is_err());
        assert!(parse_lcov_string("SF:a.rs\nBRDA:4294967297,0,0,1\nend_of_record\n").is_err());

        let collector = parse_lcov_string("SF:a.rs\nDA:4294967295,1\nend_of_record\n").unwrap();
        let file = collector.file_coverage_for("a.rs").unwrap();
        assert_eq!(file.lines.get(&u32::MAX), Some(&1));
    }

    #[test]
    fn test_empty_lcov() {
        let collector = parse_lcov_string("").unwrap();
        assert!(collector.is_empty());
    }
}
