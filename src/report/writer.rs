//! Destinations for rendered reports

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// How the default file writer delivers the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Stream lines straight to the destination while walking the tree
    #[default]
    Sync,
    /// Render in memory, then write the file with tokio
    Async,
}

/// Render callback handed a line-oriented sink for the destination
pub type RenderFn<'a> = dyn FnMut(&mut dyn Write) -> Result<()> + 'a;

/// Opens a destination, lets the caller render into it, then closes it.
///
/// Returning `Ok` means every byte has been flushed.
pub trait ReportWriter {
    fn write_file(&mut self, path: &Path, render: &mut RenderFn<'_>) -> Result<()>;
}

/// Writes reports to the filesystem
#[derive(Debug, Default)]
pub struct FileWriter;

impl FileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl ReportWriter for FileWriter {
    fn write_file(&mut self, path: &Path, render: &mut RenderFn<'_>) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create report file: {}", path.display()))?;
        let mut out = BufWriter::new(file);

        render(&mut out).with_context(|| format!("Failed to write report: {}", path.display()))?;

        out.flush()
            .with_context(|| format!("Failed to flush report: {}", path.display()))?;
        Ok(())
    }
}

/// Keeps rendered reports in memory, keyed by destination path
#[derive(Debug, Default)]
pub struct MemoryWriter {
    outputs: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered content for `path`, if it was written and is valid UTF-8
    pub fn contents(&self, path: &Path) -> Option<&str> {
        self.outputs
            .get(path)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

impl ReportWriter for MemoryWriter {
    fn write_file(&mut self, path: &Path, render: &mut RenderFn<'_>) -> Result<()> {
        let mut buf = Vec::new();
        render(&mut buf)?;
        self.outputs.insert(path.to_path_buf(), buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_writer_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports/nested/out.xml");

        let mut writer = FileWriter::new();
        writer
            .write_file(&path, &mut |out| {
                writeln!(out, "<coverage version=\"1\">")?;
                writeln!(out, "</coverage>")?;
                Ok(())
            })
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "<coverage version=\"1\">\n</coverage>\n");
    }

    #[test]
    fn test_file_writer_propagates_render_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xml");

        let mut writer = FileWriter::new();
        let result = writer.write_file(&path, &mut |_| anyhow::bail!("boom"));

        assert!(result.is_err());
    }

    #[test]
    fn test_file_writer_unwritable_destination() {
        let dir = tempdir().unwrap();
        // A regular file where a directory is expected
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let mut writer = FileWriter::new();
        let result = writer.write_file(&blocker.join("out.xml"), &mut |_| Ok(()));

        assert!(result.is_err());
    }

    #[test]
    fn test_memory_writer() {
        let mut writer = MemoryWriter::new();
        let path = Path::new("out/report.xml");

        writer
            .write_file(path, &mut |out| {
                write!(out, "hello")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(writer.contents(path), Some("hello"));
        assert!(writer.contents(Path::new("missing.xml")).is_none());
    }
}
