use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tmlharvest::config::{BadFilePolicy, HarvestConfig, TransportErrorPolicy, load_config};
use tmlharvest::harness::run_verify;
use tmlharvest::pipeline::{FetchOptions, fetch_resources, merge_originals, validate_config};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tmlharvest", about = "Download yearly match CSVs and merge them into one file")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Fetch {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        start_year: Option<i32>,
        #[arg(long)]
        end_year: Option<i32>,
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },
    Merge {
        #[arg(long, default_value_t = false)]
        skip_bad_files: bool,
    },
    Run {
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
        #[arg(long, default_value_t = false)]
        skip_bad_files: bool,
    },
    Verify,
    Validate,
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.paths.data_dir = data_dir;
    }

    match cli.command {
        Commands::Fetch {
            base_url,
            start_year,
            end_year,
            fail_fast,
        } => {
            if let Some(base_url) = base_url {
                config.fetch.base_url = base_url;
            }
            if let Some(year) = start_year {
                config.fetch.resources.start_year = year;
            }
            if let Some(year) = end_year {
                config.fetch.resources.end_year = year;
            }
            if fail_fast {
                config.fetch.on_transport_error = TransportErrorPolicy::Abort;
            }
            config.validate()?;
            fetch(&config)?;
        }
        Commands::Merge { skip_bad_files } => {
            if skip_bad_files {
                config.merge.on_bad_file = BadFilePolicy::Skip;
            }
            merge(&config)?;
        }
        Commands::Run {
            fail_fast,
            skip_bad_files,
        } => {
            if fail_fast {
                config.fetch.on_transport_error = TransportErrorPolicy::Abort;
            }
            if skip_bad_files {
                config.merge.on_bad_file = BadFilePolicy::Skip;
            }
            fetch(&config)?;
            merge(&config)?;
        }
        Commands::Verify => {
            let report = run_verify(&config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.identical {
                bail!("merge output differs between two runs on the same inputs");
            }
        }
        Commands::Validate => {
            let label = cli
                .config
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in defaults".to_string());
            for line in validate_config(&config, &label)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn fetch(config: &HarvestConfig) -> Result<()> {
    let report = fetch_resources(config, &FetchOptions::from_config(config))?;
    if report.downloaded() == 0 && report.attempted() > 0 {
        warn!("no resources were downloaded");
    }
    Ok(())
}

fn merge(config: &HarvestConfig) -> Result<()> {
    let report = merge_originals(config)?;
    println!("{}", report.summary_line());
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}
