use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::report::{ReportOptions, SonarReport, WriteMode};

pub const CONFIG_FILE: &str = "sonarcov.toml";
pub const DEFAULT_INPUT: &str = "coverage/coverage.json";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Report type to produce
    #[serde(default = "default_reporter")]
    pub reporter: String,
    /// Output directory (default: working directory)
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Output file name (default: sonar-coverage.xml)
    #[serde(default)]
    pub file: Option<String>,
    /// Coverage data to read
    #[serde(default = "default_input")]
    pub input: PathBuf,
    /// Coverage data format: istanbul or lcov
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub mode: WriteMode,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            reporter: default_reporter(),
            dir: None,
            file: None,
            input: default_input(),
            format: default_format(),
            mode: WriteMode::default(),
        }
    }
}

fn default_reporter() -> String {
    SonarReport::TYPE.to_string()
}

fn default_input() -> PathBuf {
    PathBuf::from(DEFAULT_INPUT)
}

fn default_format() -> String {
    "istanbul".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let report = &self.report;

        if let Some(ref file) = report.file {
            if file.is_empty() {
                anyhow::bail!("report.file must not be empty");
            }
            if file.contains('/') || file.contains('\\') {
                anyhow::bail!(
                    "report.file '{}' must be a file name; use report.dir for the directory",
                    file
                );
            }
        }

        match report.format.to_lowercase().as_str() {
            "istanbul" | "json" | "lcov" => {}
            other => anyhow::bail!(
                "Unknown coverage format '{}'. Supported: istanbul, lcov",
                other
            ),
        }

        Ok(())
    }
}

impl ReportConfig {
    /// Options for building the report, relative paths resolved against `base_dir`
    pub fn report_options(&self, base_dir: &Path) -> ReportOptions {
        ReportOptions {
            dir: Some(
                self.dir
                    .as_ref()
                    .map(|d| base_dir.join(d))
                    .unwrap_or_else(|| base_dir.to_path_buf()),
            ),
            file: self.file.clone(),
            project_root: Some(base_dir.to_path_buf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[report]
dir = "reports"
file = "coverage.xml"
input = "build/lcov.info"
format = "lcov"
mode = "async"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        config.validate().unwrap();

        assert_eq!(config.report.reporter, "sonarreport");
        assert_eq!(config.report.dir, Some(PathBuf::from("reports")));
        assert_eq!(config.report.file.as_deref(), Some("coverage.xml"));
        assert_eq!(config.report.input, PathBuf::from("build/lcov.info"));
        assert_eq!(config.report.mode, WriteMode::Async);
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.report.input, PathBuf::from(DEFAULT_INPUT));
        assert_eq!(config.report.format, "istanbul");
        assert_eq!(config.report.mode, WriteMode::Sync);
        assert!(config.report.file.is_none());
    }

    #[test]
    fn test_invalid_file_name() {
        let config: Config = toml::from_str("[report]\nfile = \"out/x.xml\"\n").unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str("[report]\nfile = \"\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_format() {
        let config: Config = toml::from_str("[report]\nformat = \"clover\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_mode_fails_to_parse() {
        let result: Result<Config, _> = toml::from_str("[report]\nmode = \"later\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join(CONFIG_FILE);
        let config = Config::load_or_default(&missing).unwrap();
        assert_eq!(config.report.format, "istanbul");

        fs::write(&missing, "[report]\nfile = \"custom.xml\"\n").unwrap();
        let config = Config::load_or_default(&missing).unwrap();
        assert_eq!(config.report.file.as_deref(), Some("custom.xml"));
    }

    #[test]
    fn test_report_options() {
        let config: Config = toml::from_str("[report]\ndir = \"reports\"\n").unwrap();
        let options = config.report.report_options(Path::new("/project"));

        assert_eq!(options.dir, Some(PathBuf::from("/project/reports")));
        assert_eq!(options.project_root, Some(PathBuf::from("/project")));
        assert!(options.file.is_none());
    }
}
