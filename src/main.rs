mod analysis;
mod api;
mod collector;
mod config;
mod models;
mod regions;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use polars::prelude::DataFrame;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use analysis::Analyzer;
use api::{http_client, EiaClient, OpenMeteoClient, RetryPolicy};
use collector::{date_range, Collector};
use config::AppConfig;
use regions::RegionRegistry;

#[derive(Parser)]
#[command(name = "eia-weather", about = "Hourly grid demand vs. weather for US balancing regions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, merge and analyze demand and weather for one region
    Analyze {
        /// Region key (see `regions`)
        #[arg(short, long, default_value = "ciso_pgae")]
        region: String,
        /// Days of history to fetch
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Also write the report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Directory for the merged CSV snapshot
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,
        /// Print summary statistics and the hourly profile after the report
        #[arg(long)]
        details: bool,
    },
    /// List known regions
    Regions,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before anything reads the environment
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eia_weather=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load()?;
    let registry = RegionRegistry::builtin().with_overrides(&config.regions);

    match cli.command {
        Commands::Regions => {
            println!("\n{:<12} {:<45} {:>6} {:>6} {:>9} {:>10}", "Key", "Name", "Parent", "SubBA", "Lat", "Lon");
            println!("{}", "-".repeat(93));
            for (key, r) in registry.iter() {
                println!(
                    "{:<12} {:<45} {:>6} {:>6} {:>9.4} {:>10.4}",
                    key, r.name, r.parent, r.subba, r.lat, r.lon
                );
            }
            println!("\n{} regions", registry.len());
        }
        Commands::Analyze { region, days, output, data_dir, details } => {
            let (start, end) = date_range(days, Utc::now())?;
            info!("Analyzing {} from {} to {}", region, start, end);

            let http = http_client(&config.http).context("failed to build HTTP client")?;
            let retry = RetryPolicy::from(&config.http);
            let energy_client = EiaClient::new(http.clone(), &config.eia, retry);
            let weather_client = OpenMeteoClient::new(http, &config.weather.base_url, retry);

            let collector = Collector::new(&registry, &region, &energy_client, &weather_client, &config.weather)?;
            let target = collector.region();
            info!("Region {}: {}/{} at ({:.4}, {:.4})", target.name, target.parent, target.subba, target.lat, target.lon);
            let (energy, weather) = collector.collect_data(&start, &end).await?;
            let mut merged = collector.merge_datasets(&energy, &weather)?;
            info!("Merged dataset: {} rows, {} columns", merged.height(), merged.width());

            let analyzer = Analyzer::new(merged.clone());
            let report = analyzer.generate_report();
            println!("{report}");
            if details {
                println!("\n{}", analyzer.generate_details());
            }

            if let Some(path) = output {
                std::fs::write(&path, &report)
                    .with_context(|| format!("failed to write report to {}", path.display()))?;
                info!("Report saved to {}", path.display());
            }

            let csv_path = data_dir.join(format!("energy_weather_data_{region}_{start}_to_{end}.csv"));
            save_csv(&mut merged, &csv_path)?;
            info!("Data saved to {}", csv_path.display());
        }
    }

    Ok(())
}

fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    models::frame::write_csv(df, BufWriter::new(file))
        .with_context(|| format!("failed to write {}", path.display()))
}
