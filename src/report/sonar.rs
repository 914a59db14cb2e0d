//! SonarQube generic coverage report
//!
//! Produces:
//!
//! ```text
//! <coverage version="1">
//! 	<file path="src/app.js">
//! 		<lineToCover lineNumber="3" covered="true" branch="false" />
//! 		<lineToCover lineNumber="5" covered="true" branch="true" branchesToCover="3" coveredBranches="2" />
//! 	</file>
//! </coverage>
//! ```

use anyhow::Result;
use chrono::Utc;
use quick_xml::escape::escape;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use super::{Report, ReportDefaults, ReportOptions, ReportOutcome, ReportWriter};
use crate::coverage::{branch_coverage_by_line, CoverageAccessor, FileCoverage};
use crate::summary::{summarize_file_coverage, SummaryNode, TreeSummarizer};

const DEFAULT_FILE: &str = "sonar-coverage.xml";

/// Report writing one `<file>` block per covered source file
#[derive(Debug, Clone)]
pub struct SonarReport {
    project_root: PathBuf,
    dir: PathBuf,
    file: String,
}

/// Counts accumulated during the walk
#[derive(Debug, Default, Clone, Copy)]
struct WalkStats {
    files: usize,
    lines: usize,
}

impl SonarReport {
    pub const TYPE: &'static str = "sonarreport";

    pub fn new(options: ReportOptions) -> Self {
        let project_root = options
            .project_root
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let dir = options.dir.unwrap_or_else(|| project_root.clone());
        let file = options.file.unwrap_or_else(|| DEFAULT_FILE.to_string());

        Self {
            project_root,
            dir,
            file,
        }
    }

    /// Render the report into a string
    pub fn render(&self, accessor: &dyn CoverageAccessor) -> Result<String> {
        let root = build_tree(accessor);
        let mut buf = Vec::new();
        walk(&root, accessor, &mut buf, 0, &self.project_root, &mut WalkStats::default())?;
        Ok(String::from_utf8(buf)?)
    }
}

impl Report for SonarReport {
    fn synopsis(&self) -> &'static str {
        "XML coverage report in the SonarQube generic coverage format"
    }

    fn default_config(&self) -> ReportDefaults {
        ReportDefaults { file: DEFAULT_FILE }
    }

    fn output_path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }

    fn write_report(
        &self,
        accessor: &dyn CoverageAccessor,
        writer: &mut dyn ReportWriter,
    ) -> Result<ReportOutcome> {
        let root = build_tree(accessor);
        let path = self.output_path();
        let mut stats = WalkStats::default();

        writer.write_file(&path, &mut |out| {
            walk(&root, accessor, out, 0, &self.project_root, &mut stats)?;
            Ok(())
        })?;

        Ok(ReportOutcome {
            path,
            files: stats.files,
            lines: stats.lines,
            generated_at: Utc::now(),
        })
    }
}

/// Summarize every file the accessor knows about into a tree
fn build_tree(accessor: &dyn CoverageAccessor) -> SummaryNode {
    let mut summarizer = TreeSummarizer::new();
    for key in accessor.files() {
        if let Some(coverage) = accessor.file_coverage_for(&key) {
            summarizer.add_file_coverage_summary(key.as_str(), summarize_file_coverage(coverage));
        }
    }
    summarizer.get_tree_summary().root
}

/// Depth-first walk: a node's own files first, then its subdirectories
fn walk(
    node: &SummaryNode,
    accessor: &dyn CoverageAccessor,
    out: &mut dyn Write,
    level: usize,
    project_root: &Path,
    stats: &mut WalkStats,
) -> std::io::Result<()> {
    if level == 0 {
        writeln!(out, "<coverage version=\"1\">")?;
    }

    if node.package_metrics.is_some() {
        for child in node.files() {
            let coverage = child.file_key().and_then(|key| accessor.file_coverage_for(key));
            if let Some(coverage) = coverage {
                add_file_stats(child, coverage, out, project_root, stats)?;
            }
        }
    }

    for child in node.dirs() {
        walk(child, accessor, out, level + 1, project_root, stats)?;
    }

    if level == 0 {
        writeln!(out, "</coverage>")?;
    }

    Ok(())
}

fn add_file_stats(
    node: &SummaryNode,
    coverage: &FileCoverage,
    out: &mut dyn Write,
    project_root: &Path,
    stats: &mut WalkStats,
) -> std::io::Result<()> {
    let path = relative_path(project_root, node.full_path());
    writeln!(out, "\t<file{}>", attr("path", &path.to_string_lossy()))?;

    let coverage = coverage.with_ignored_totals();
    let branch_by_line = branch_coverage_by_line(&coverage);

    for (line, hits) in &coverage.lines {
        let mut element = format!(
            "\t\t<lineToCover{}{}",
            attr("lineNumber", line),
            attr("covered", *hits != 0)
        );

        match branch_by_line.get(line) {
            None => element.push_str(&attr("branch", false)),
            Some(detail) => {
                element.push_str(&attr("branch", true));
                element.push_str(&attr("branchesToCover", detail.total));
                element.push_str(&attr("coveredBranches", detail.covered));
            }
        }

        writeln!(out, "{} />", element)?;
        stats.lines += 1;
    }

    writeln!(out, "\t</file>")?;
    stats.files += 1;
    Ok(())
}

/// ` name="value"` with the value XML-escaped
fn attr(name: &str, value: impl ToString) -> String {
    format!(" {}=\"{}\"", name, escape(&value.to_string()))
}

/// `target` relative to `root`, resolving `.` and `..` lexically
fn relative_path(root: &Path, target: &Path) -> PathBuf {
    let root = normalize(root);
    let target = normalize(&root.join(target));

    let root_parts: Vec<Component> = root.components().collect();
    let target_parts: Vec<Component> = target.components().collect();
    let shared = root_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in shared..root_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[shared..] {
        relative.push(part.as_os_str());
    }
    relative
}

fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            _ => parts.push(component),
        }
    }
    parts.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{BranchMapping, Collector, Location};
    use crate::report::MemoryWriter;
    use quick_xml::events::Event;
    use quick_xml::Reader;

    fn report() -> SonarReport {
        SonarReport::new(ReportOptions {
            dir: Some(PathBuf::from("/out")),
            file: None,
            project_root: Some(PathBuf::from("/project")),
        })
    }

    fn file(lines: &[(u32, u64)]) -> FileCoverage {
        let mut coverage = FileCoverage::new("");
        for (line, hits) in lines {
            coverage.lines.insert(*line, *hits);
        }
        coverage
    }

    fn branch(coverage: &mut FileCoverage, id: &str, line: u32, hits: Vec<u64>) {
        let locations = vec![Location::default(); hits.len()];
        coverage.branch_map.insert(
            id.to_string(),
            BranchMapping { line, loc: None, kind: "if".into(), locations },
        );
        coverage.branch_hits.insert(id.to_string(), hits);
    }

    /// Element names and their attributes, in document order
    fn elements(xml: &str) -> Vec<(String, Vec<(String, String)>)> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut found = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    let attrs = e
                        .attributes()
                        .map(|a| {
                            let a = a.unwrap();
                            (
                                String::from_utf8_lossy(a.key.as_ref()).to_string(),
                                a.unescape_value().unwrap().to_string(),
                            )
                        })
                        .collect();
                    found.push((String::from_utf8_lossy(e.name().as_ref()).to_string(), attrs));
                }
                Ok(Event::Eof) => break,
                Err(e) => panic!("malformed XML: {}", e),
                _ => {}
            }
            buf.clear();
        }

        found
    }

    #[test]
    fn test_empty_input() {
        let xml = report().render(&Collector::new()).unwrap();
        assert_eq!(xml, "<coverage version=\"1\">\n</coverage>\n");
    }

    #[test]
    fn test_line_elements() {
        let mut coverage = file(&[(1, 0), (2, 1), (5, 3), (7, 0)]);
        branch(&mut coverage, "b1", 5, vec![1, 0]);
        branch(&mut coverage, "b2", 5, vec![2]);
        branch(&mut coverage, "b3", 7, vec![0, 0]);

        let mut collector = Collector::new();
        collector.add("/project/src/app.js", coverage);

        let xml = report().render(&collector).unwrap();

        let expected = "<coverage version=\"1\">\n\
\t<file path=\"src/app.js\">\n\
\t\t<lineToCover lineNumber=\"1\" covered=\"false\" branch=\"false\" />\n\
\t\t<lineToCover lineNumber=\"2\" covered=\"true\" branch=\"false\" />\n\
\t\t<lineToCover lineNumber=\"5\" covered=\"true\" branch=\"true\" branchesToCover=\"3\" coveredBranches=\"2\" />\n\
\t\t<lineToCover lineNumber=\"7\" covered=\"false\" branch=\"true\" branchesToCover=\"2\" coveredBranches=\"0\" />\n\
\t</file>\n\
</coverage>\n";
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_skipped_branch_outcome_counts_as_covered() {
        let mut coverage = file(&[(4, 1)]);
        coverage.branch_map.insert(
            "1".into(),
            BranchMapping {
                line: 4,
                loc: None,
                kind: "if".into(),
                locations: vec![Location::default(), Location { skip: true, ..Default::default() }],
            },
        );
        coverage.branch_hits.insert("1".into(), vec![1, 0]);

        let mut collector = Collector::new();
        collector.add("/project/a.js", coverage);

        let xml = report().render(&collector).unwrap();
        assert!(xml.contains("branchesToCover=\"2\" coveredBranches=\"2\""));
    }

    #[test]
    fn test_skipped_statement_line_is_covered() {
        let json = r#"{
  "/project/src/app.js": {
    "path": "/project/src/app.js",
    "s": {"1": 0, "2": 0},
    "statementMap": {
      "1": {"start": {"line": 1, "column": 0}, "end": {"line": 1, "column": 10}, "skip": true},
      "2": {"start": {"line": 2, "column": 0}, "end": {"line": 2, "column": 10}}
    }
  }
}"#;
        let collector = crate::coverage::parse_istanbul_json(json).unwrap();

        let xml = report().render(&collector).unwrap();

        assert!(xml.contains("lineNumber=\"1\" covered=\"true\""));
        assert!(xml.contains("lineNumber=\"2\" covered=\"false\""));
    }

    #[test]
    fn test_tree_round_trip() {
        let mut collector = Collector::new();
        collector.add("/project/src/b.js", file(&[(1, 1)]));
        collector.add("/project/src/a.js", file(&[(1, 0)]));
        collector.add("/project/src/lib/c.js", file(&[(2, 2)]));

        let xml = report().render(&collector).unwrap();
        let found = elements(&xml);

        let coverage_count = found.iter().filter(|(name, _)| name == "coverage").count();
        assert_eq!(coverage_count, 1);

        let paths: Vec<&str> = found
            .iter()
            .filter(|(name, _)| name == "file")
            .map(|(_, attrs)| attrs[0].1.as_str())
            .collect();
        assert_eq!(paths, vec!["src/a.js", "src/b.js", "src/lib/c.js"]);
        assert!(xml.starts_with("<coverage version=\"1\">\n"));
        assert!(xml.ends_with("</coverage>\n"));
    }

    #[test]
    fn test_deep_nesting_keeps_single_root() {
        let mut collector = Collector::new();
        collector.add("/project/a/b/c/d/e.js", file(&[(1, 1)]));
        collector.add("/project/x/y.js", file(&[(1, 1)]));

        let xml = report().render(&collector).unwrap();

        assert_eq!(xml.matches("<coverage").count(), 1);
        assert_eq!(xml.matches("</coverage>").count(), 1);
        assert_eq!(xml.matches("<file ").count(), 2);
        assert!(xml.contains("path=\"a/b/c/d/e.js\""));
    }

    #[test]
    fn test_escapes_path_characters() {
        let mut collector = Collector::new();
        collector.add("/project/src/<a & \"b\">.js", file(&[(1, 1)]));

        let xml = report().render(&collector).unwrap();

        assert!(xml.contains("path=\"src/&lt;a &amp; &quot;b&quot;&gt;.js\""));
        let found = elements(&xml);
        let file = found.iter().find(|(name, _)| name == "file").unwrap();
        assert_eq!(file.1[0].1, "src/<a & \"b\">.js");
    }

    #[test]
    fn test_path_outside_project_root() {
        let mut collector = Collector::new();
        collector.add("/elsewhere/lib.js", file(&[(1, 1)]));

        let xml = report().render(&collector).unwrap();
        assert!(xml.contains("path=\"../elsewhere/lib.js\""));
    }

    #[test]
    fn test_relative_keys_resolve_against_project_root() {
        let mut collector = Collector::new();
        collector.add("src/./util/../app.js", file(&[(1, 1)]));

        let xml = report().render(&collector).unwrap();
        assert!(xml.contains("path=\"src/app.js\""));
    }

    #[test]
    fn test_deterministic_output() {
        let build = || {
            let mut collector = Collector::new();
            for name in ["z.js", "m/n.js", "a.js", "m/a.js"] {
                let mut coverage = file(&[(3, 1), (1, 0), (2, 4)]);
                branch(&mut coverage, "1", 2, vec![0, 1]);
                collector.add(format!("/project/{}", name), coverage);
            }
            collector
        };

        let first = report().render(&build()).unwrap();
        let second = report().render(&build()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_write_report_through_injected_writer() {
        let mut collector = Collector::new();
        collector.add("/project/src/a.js", file(&[(1, 1), (2, 0)]));
        collector.add("/project/src/b.js", file(&[(1, 1)]));

        let report = report();
        let mut writer = MemoryWriter::new();
        let outcome = report.write_report(&collector, &mut writer).unwrap();

        assert_eq!(outcome.path, PathBuf::from("/out/sonar-coverage.xml"));
        assert_eq!(outcome.files, 2);
        assert_eq!(outcome.lines, 3);
        assert_eq!(
            writer.contents(&outcome.path).unwrap(),
            report.render(&collector).unwrap()
        );
    }

    #[test]
    fn test_generate_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = SonarReport::new(ReportOptions {
            dir: Some(dir.path().to_path_buf()),
            file: Some("coverage.xml".to_string()),
            project_root: Some(PathBuf::from("/project")),
        });

        let outcome = report.generate(&Collector::new()).unwrap();

        assert_eq!(outcome.path, dir.path().join("coverage.xml"));
        assert_eq!(
            std::fs::read_to_string(&outcome.path).unwrap(),
            "<coverage version=\"1\">\n</coverage>\n"
        );
    }

    #[test]
    fn test_defaults() {
        let report = SonarReport::new(ReportOptions {
            project_root: Some(PathBuf::from("/project")),
            ..Default::default()
        });
        assert_eq!(report.output_path(), PathBuf::from("/project/sonar-coverage.xml"));
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/a/b");
        assert_eq!(relative_path(root, Path::new("/a/b/c.js")), PathBuf::from("c.js"));
        assert_eq!(relative_path(root, Path::new("/a/x/c.js")), PathBuf::from("../x/c.js"));
        assert_eq!(relative_path(root, Path::new("c/../d.js")), PathBuf::from("d.js"));
    }
}
