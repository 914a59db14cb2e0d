//! Directory tree of coverage summaries

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use super::CoverageSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
}

/// A node in the summary tree (a directory or a source file)
#[derive(Debug, Clone)]
pub struct SummaryNode {
    /// Last path component (the common prefix for the root)
    pub name: String,
    pub kind: NodeKind,
    /// Child nodes, sorted by name
    pub children: Vec<SummaryNode>,
    /// Aggregate of everything below this node
    pub metrics: CoverageSummary,
    /// Aggregate of the direct file children, if there are any
    pub package_metrics: Option<CoverageSummary>,
    path: PathBuf,
    key: Option<String>,
}

impl SummaryNode {
    fn new_dir(name: String, path: PathBuf) -> Self {
        Self {
            name,
            kind: NodeKind::Dir,
            children: Vec::new(),
            metrics: CoverageSummary::default(),
            package_metrics: None,
            path,
            key: None,
        }
    }

    fn new_file(key: &str, summary: CoverageSummary) -> Self {
        let path = PathBuf::from(key);
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| key.to_string());

        Self {
            name,
            kind: NodeKind::File,
            children: Vec::new(),
            metrics: summary,
            package_metrics: None,
            path,
            key: Some(key.to_string()),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }

    /// Path of the directory, or the file key for files
    pub fn full_path(&self) -> &Path {
        &self.path
    }

    /// Key the file was registered under (files only)
    pub fn file_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Direct children that are files
    pub fn files(&self) -> impl Iterator<Item = &SummaryNode> {
        self.children.iter().filter(|c| c.is_file())
    }

    /// Direct children that are directories
    pub fn dirs(&self) -> impl Iterator<Item = &SummaryNode> {
        self.children.iter().filter(|c| c.is_dir())
    }

    /// Find or create a child directory node
    fn get_or_create_dir(&mut self, name: &str) -> &mut SummaryNode {
        let idx = match self
            .children
            .iter()
            .position(|c| c.is_dir() && c.name == name)
        {
            Some(idx) => idx,
            None => {
                let path = self.path.join(name);
                self.children.push(SummaryNode::new_dir(name.to_string(), path));
                self.children.len() - 1
            }
        };
        &mut self.children[idx]
    }

    fn sort(&mut self) {
        self.children.sort_by(|a, b| a.name.cmp(&b.name));
        for child in &mut self.children {
            child.sort();
        }
    }

    /// Aggregate metrics bottom-up
    fn calculate_metrics(&mut self) {
        if self.is_file() {
            return;
        }

        let mut metrics = CoverageSummary::default();
        let mut package_metrics: Option<CoverageSummary> = None;

        for child in &mut self.children {
            child.calculate_metrics();
            metrics.merge(&child.metrics);
            if child.is_file() {
                package_metrics
                    .get_or_insert_with(CoverageSummary::default)
                    .merge(&child.metrics);
            }
        }

        self.metrics = metrics;
        self.package_metrics = package_metrics;
    }
}

/// Rooted summary tree
#[derive(Debug, Clone)]
pub struct TreeSummary {
    /// Longest directory shared by every file
    pub prefix: PathBuf,
    pub root: SummaryNode,
}

/// Collects per-file summaries and builds the tree
#[derive(Debug, Default)]
pub struct TreeSummarizer {
    summaries: BTreeMap<String, CoverageSummary>,
}

impl TreeSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file_coverage_summary(&mut self, key: impl Into<String>, summary: CoverageSummary) {
        self.summaries.insert(key.into(), summary);
    }

    pub fn get_tree_summary(&self) -> TreeSummary {
        let prefix = common_parent(self.summaries.keys().map(|k| Path::new(k.as_str())));
        let mut root = SummaryNode::new_dir(prefix.to_string_lossy().to_string(), prefix.clone());

        for (key, summary) in &self.summaries {
            let parent = Path::new(key).parent().unwrap_or_else(|| Path::new(""));
            let relative = parent.strip_prefix(&prefix).unwrap_or(parent);

            let mut node = &mut root;
            for component in relative.components() {
                let name = component.as_os_str().to_string_lossy().to_string();
                node = node.get_or_create_dir(&name);
            }
            node.children.push(SummaryNode::new_file(key, *summary));
        }

        root.sort();
        root.calculate_metrics();

        TreeSummary { prefix, root }
    }
}

/// Longest common directory of the given file paths
fn common_parent<'a>(paths: impl Iterator<Item = &'a Path>) -> PathBuf {
    let mut common: Option<Vec<Component<'a>>> = None;

    for path in paths {
        let parent: Vec<Component<'a>> = path
            .parent()
            .map(|p| p.components().collect())
            .unwrap_or_default();

        common = Some(match common {
            None => parent,
            Some(prev) => prev
                .into_iter()
                .zip(parent)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }

    common.unwrap_or_default().into_iter().collect()
}
