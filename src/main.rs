use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use std::path::{Path, PathBuf};

use sonarcov::config::{Config, ReportConfig, CONFIG_FILE};
use sonarcov::{
    load_coverage, summarize_file_coverage, Collector, CoverageAccessor, Metric,
    Report, ReportOutcome, SummaryNode, TreeSummarizer, WriteMode,
};

/// Istanbul's default watermarks
const LOW_WATERMARK: f64 = 50.0;
const HIGH_WATERMARK: f64 = 80.0;

#[derive(Parser)]
#[command(name = "sonarcov")]
#[command(about = "Convert coverage data into SonarQube generic coverage XML")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: sonarcov.toml, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the coverage report
    Report {
        /// Coverage data to read (default: coverage/coverage.json)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Coverage data format: istanbul or lcov
        #[arg(long)]
        format: Option<String>,

        /// Output directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Output file name (default: sonar-coverage.xml)
        #[arg(short, long)]
        file: Option<String>,

        /// Write the report asynchronously
        #[arg(long = "async")]
        async_write: bool,
    },

    /// Print line and branch coverage per directory
    Summary {
        /// Coverage data to read (default: coverage/coverage.json)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Coverage data format: istanbul or lcov
        #[arg(long)]
        format: Option<String>,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let (config, base_dir) = match cli.config {
        Some(path) => {
            // Canonicalize config path to get absolute path, then get parent
            let path = std::fs::canonicalize(&path)
                .with_context(|| format!("Could not find config file: {}", path.display()))?;
            let config = Config::load(&path)?;
            let base_dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(current_dir);
            (config, base_dir)
        }
        None => {
            let base_dir = current_dir();
            let config = Config::load_or_default(&base_dir.join(CONFIG_FILE))?;
            (config, base_dir)
        }
    };

    let mut report_config = config.report;

    match cli.command {
        Commands::Report { input, format, dir, file, async_write } => {
            if let Some(input) = input {
                report_config.input = input;
            }
            if let Some(format) = format {
                report_config.format = format;
            }
            if dir.is_some() {
                report_config.dir = dir;
            }
            if file.is_some() {
                report_config.file = file;
            }
            if async_write {
                report_config.mode = WriteMode::Async;
            }
            cmd_report(&report_config, &base_dir)
        }
        Commands::Summary { input, format } => {
            if let Some(input) = input {
                report_config.input = input;
            }
            if let Some(format) = format {
                report_config.format = format;
            }
            cmd_summary(&report_config, &base_dir)
        }
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn load(report_config: &ReportConfig, base_dir: &Path) -> Result<Collector> {
    // Validate again once CLI overrides are applied
    Config { report: report_config.clone() }.validate()?;

    let input = base_dir.join(&report_config.input);
    let collector = load_coverage(&input, &report_config.format)?;

    for (key, ids) in collector.inconsistencies() {
        eprintln!(
            "{} {}: branch ids without matching map/hit entries skipped: {}",
            "Warning:".yellow().bold(),
            key,
            ids.join(", ")
        );
    }

    Ok(collector)
}

fn cmd_report(report_config: &ReportConfig, base_dir: &Path) -> Result<()> {
    let collector = load(report_config, base_dir)?;
    let report = sonarcov::create(
        &report_config.reporter,
        report_config.report_options(base_dir),
    )?;

    println!(
        "{} {} ({} files, {} mode)",
        "▶".cyan(),
        report.synopsis(),
        collector.len(),
        match report_config.mode {
            WriteMode::Sync => "sync",
            WriteMode::Async => "async",
        }
    );

    let outcome = match report_config.mode {
        WriteMode::Sync => report.generate(&collector)?,
        WriteMode::Async => write_async(report.as_ref(), &collector)?,
    };

    println!(
        "{} Report written: {} ({} files, {} lines, {})",
        "✓".green(),
        outcome.path.display().to_string().green(),
        outcome.files,
        outcome.lines,
        outcome.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string().dimmed()
    );

    Ok(())
}

#[tokio::main]
async fn write_async(report: &dyn Report, collector: &Collector) -> Result<ReportOutcome> {
    sonarcov::write_report_async(report, collector).await
}

fn cmd_summary(report_config: &ReportConfig, base_dir: &Path) -> Result<()> {
    let collector = load(report_config, base_dir)?;

    let mut summarizer = TreeSummarizer::new();
    for key in collector.files() {
        if let Some(coverage) = collector.file_coverage_for(&key) {
            summarizer.add_file_coverage_summary(key.as_str(), summarize_file_coverage(coverage));
        }
    }
    let tree = summarizer.get_tree_summary();

    println!("\n{} {}\n", "📦".cyan(), tree.prefix.display().to_string().bold());

    if collector.is_empty() {
        println!("  {}", "No coverage data".dimmed());
        return Ok(());
    }

    print_packages(&tree.root, &tree.prefix);

    println!();
    println!(
        "  {} Lines: {} ({}/{})  Branches: {} ({}/{})",
        "Σ".bold(),
        pct(&tree.root.metrics.lines),
        tree.root.metrics.lines.covered,
        tree.root.metrics.lines.total,
        pct(&tree.root.metrics.branches),
        tree.root.metrics.branches.covered,
        tree.root.metrics.branches.total,
    );

    Ok(())
}

fn print_packages(node: &SummaryNode, prefix: &Path) {
    if let Some(ref package) = node.package_metrics {
        let name = node
            .full_path()
            .strip_prefix(prefix)
            .ok()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string());

        println!(
            "  {} {} lines {}  branches {}",
            "•".green(),
            format!("{:<40}", name).cyan(),
            pct(&package.lines),
            pct(&package.branches)
        );
    }

    for child in node.dirs() {
        print_packages(child, prefix);
    }
}

fn pct(metric: &Metric) -> ColoredString {
    let text = format!("{:>7.2}%", metric.pct);
    if metric.pct >= HIGH_WATERMARK {
        text.green()
    } else if metric.pct >= LOW_WATERMARK {
        text.yellow()
    } else {
        text.red()
    }
}
