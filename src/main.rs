use std::path::PathBuf;

use anyhow::{ensure, Context};
use clap::Parser;
use tracing::{info, warn};

use dusnap::config::Config;
use dusnap::crawler::UsageCrawler;
use dusnap::logging;
use dusnap::measure::{Backend, DuMeasurer, Measurer};
use dusnap::paths;
use dusnap::scanner::{run_scan, ScanConfig};

#[derive(Debug, Parser)]
#[command(name = "dusnap", about = "Analyze disk usage recursively into a browsable snapshot")]
struct Args {
    /// Base directory to analyze (default: user home)
    directory: Option<PathBuf>,

    /// Base output directory (default: ./output)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Minimum size in GiB for a subdirectory to be analyzed further (default: 2.0)
    #[arg(short = 'm', long = "min-size", value_name = "GIB")]
    min_size: Option<f64>,

    /// Use sudo for du commands (access more directories)
    #[arg(short, long)]
    sudo: bool,

    /// Suppress error output from du
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Do not expand directories that live on another filesystem
    #[arg(long)]
    no_follow_mounts: bool,

    /// How directory sizes are measured
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Also write the log to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Settings file (default: ./dusnap.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let scan = config.scan;

    let log_file = args.log_file.or(scan.log_file);
    let _guard = logging::init_console(if args.debug { "debug" } else { "info" }, log_file.as_deref())?;

    let min_size = args.min_size.unwrap_or(scan.min_size_gib);
    ensure!(
        min_size.is_finite() && min_size >= 0.0,
        "--min-size must be a non-negative number of GiB, got {}",
        min_size
    );
    let sudo = args.sudo || scan.sudo;
    let quiet = args.quiet || scan.quiet;
    let backend = args.backend.unwrap_or(scan.backend);

    let directory = args
        .directory
        .or_else(paths::home_dir)
        .context("no directory given and the home directory is unknown")?;
    let root = paths::absolute(&directory)?;
    ensure!(root.is_dir(), "{} is not a directory", root.display());
    let output_base = paths::absolute(&args.output.unwrap_or(config.output))?;

    info!("This scan measures disk usage across many directories; the system may ask for folder permissions.");
    match backend {
        Backend::Du if sudo => info!("sudo mode is enabled and may prompt for your password."),
        Backend::Walk if sudo => warn!("sudo only applies to the du backend; the walk backend runs unprivileged"),
        _ => {}
    }

    let measurer: Box<dyn Measurer> = match backend {
        Backend::Du => Box::new(DuMeasurer::new(sudo, quiet)),
        Backend::Walk => Box::new(UsageCrawler::new()),
    };

    let mut scan_config = ScanConfig::new(root, min_size);
    scan_config.follow_mounts = scan.follow_mounts && !args.no_follow_mounts;
    scan_config.quiet = quiet;

    let (run, summary) = run_scan(measurer.as_ref(), &output_base, scan_config)?;
    info!(
        listings = summary.listings_written,
        leaves = summary.leaves,
        measurement_failures = summary.measurement_failures,
        unparsed_records = summary.unparsed_records,
        write_failures = summary.write_failures,
        "analysis complete, results saved to {}",
        run.dir().display()
    );
    Ok(())
}
