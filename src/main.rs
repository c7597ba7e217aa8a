use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use classmeta::logging::init_logging;
use classmeta::report::build_report;
use classmeta::scan::scan_inputs;

/// CLI arguments for classmeta execution.
#[derive(Parser, Debug)]
#[command(
    name = "classmeta",
    about = "Class and method metadata, including meta-annotations, read from JVM class files \
             and JAR files.",
    version
)]
struct Cli {
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Extra class files, JARs, or directories that define annotation types.
    #[arg(long, value_name = "PATH")]
    classpath: Vec<PathBuf>,
    /// Only report classes annotated with this type, e.g. `org.example.Service`.
    #[arg(long, value_name = "NAME")]
    annotated_with: Option<String>,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }
    for entry in &cli.classpath {
        if !entry.exists() {
            anyhow::bail!("classpath entry not found: {}", entry.display());
        }
    }

    let started_at = Instant::now();
    let scan = scan_inputs(&cli.input, &cli.classpath)?;
    let scan_duration_ms = started_at.elapsed().as_millis();
    let report = build_report(&scan, cli.annotated_with.as_deref());

    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &report)
        .context("failed to serialize metadata report")?;
    writer
        .write_all(b"\n")
        .context("failed to write metadata report")?;
    writer.flush().context("failed to flush metadata report")?;

    if cli.timing && !cli.quiet {
        info!(
            total_ms = started_at.elapsed().as_millis() as u64,
            scan_ms = scan_duration_ms as u64,
            classes = scan.class_count,
            reported = report.classes.len(),
            "timing"
        );
    }

    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}
