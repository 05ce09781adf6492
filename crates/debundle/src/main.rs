use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use debundle::{Config, Pipeline, writer};

#[derive(Parser, Debug)]
#[command(name = "debundle", version, about)]
struct Cli {
    /// Webpack bundle to unpack
    bundle: PathBuf,

    /// Directory the recovered modules are written to
    #[arg(short, long)]
    out_dir: PathBuf,

    /// Skip modules under this path prefix (empty string keeps everything)
    #[arg(long, value_name = "PREFIX")]
    exclude_prefix: Option<String>,

    /// Drop `.js`-style extensions from generated import specifiers
    #[arg(long)]
    strip_extensions: bool,

    /// Configuration file to use instead of a `debundle.toml` next to the bundle
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Worker threads for rewriting modules
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Remove the output directory before writing
    #[arg(long)]
    clean: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(Some(&cli.bundle), cli.config.as_deref())?;
    if let Some(prefix) = &cli.exclude_prefix {
        config.excluded_path_prefix.clone_from(prefix);
    }
    if cli.strip_extensions {
        config.strip_import_extensions = true;
    }
    if let Some(jobs) = cli.jobs {
        config.jobs = Some(jobs);
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = resolve_config(&cli)?;
    debug!("Effective configuration: {config:?}");

    let text = std::fs::read_to_string(&cli.bundle)
        .with_context(|| format!("Failed to read bundle: {}", cli.bundle.display()))?;
    let output = Pipeline::new(&config)
        .run(&text)
        .with_context(|| format!("Failed to unbundle {}", cli.bundle.display()))?;

    let written = writer::write_modules(&cli.out_dir, &output.modules, cli.clean)?;
    info!(
        "Wrote {} modules to {} ({} excluded, {} diagnostics)",
        written.len(),
        cli.out_dir.display(),
        output.excluded,
        output.diagnostics.len()
    );
    Ok(())
}
