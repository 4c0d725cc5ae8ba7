use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lodzones::{
    config::{ConfigLoader, EngineConfig},
    engine::{EngineBuilder, EngineSettings, DEFAULT_SEED},
    geo::{LatLng, Viewport},
    historical::DatasetLoader,
    lod::TierTable,
    session::SessionLoader,
    snapshot::SnapshotWriter,
    surface::RecordingSurface,
    web::{self, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Viewport-driven level-of-detail zone engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a scripted session and print its summary
    Replay {
        /// Path to the session YAML file
        #[arg(long, default_value = "scenarios/lima_session.yaml")]
        session: PathBuf,

        /// Override the session seed
        #[arg(long)]
        seed: Option<u64>,

        /// Write a GeoJSON frame every N passes (0 disables)
        #[arg(long, default_value_t = 0)]
        snapshot_interval: u64,

        /// Directory for snapshots
        #[arg(long, default_value = "snapshots")]
        snapshot_dir: PathBuf,
    },
    /// Serve the engine over HTTP with an SSE stream of surface updates
    Serve {
        /// Engine config YAML (built-in defaults when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Historical dataset (YAML or JSON)
        #[arg(long)]
        dataset: Option<PathBuf>,

        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Validate an engine config and print its tier table
    CheckConfig {
        #[arg(long, default_value = "scenarios/engine.yaml")]
        config: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => ConfigLoader::new(".").load(path),
        None => Ok(EngineConfig::default()),
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            session,
            seed,
            snapshot_interval,
            snapshot_dir,
        } => {
            let mut session = SessionLoader::new(".").load(&session)?;
            if let Some(seed) = seed {
                session.seed = seed;
            }
            init_tracing(&session.load_config(Path::new("."))?.logging.level);

            let writer = SnapshotWriter::new(&snapshot_dir, snapshot_interval);
            let summary = session.run(Path::new("."), writer.is_enabled().then_some(&writer))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Serve {
            config,
            dataset,
            seed,
            host,
            port,
        } => {
            let config = load_config(config.as_ref())?;
            init_tracing(&config.logging.level);
            let dataset = match dataset {
                Some(path) => DatasetLoader::new(".").load(path)?,
                None => Default::default(),
            };
            let surface = RecordingSurface::new(
                Viewport::new(LatLng::new(-12.10, -77.10), LatLng::new(-11.99, -76.95)),
                config.map.min_zoom,
            );
            let engine = EngineBuilder::new(EngineSettings { seed, config })
                .with_dataset(dataset)
                .build(surface)
                .context("Invalid engine configuration")?;
            web::run(WebServerConfig { engine, host, port }).await?;
        }
        Command::CheckConfig { config } => {
            let config = load_config(Some(&config))?;
            let table = TierTable::from_config(&config)
                .context("Engine configuration failed validation")?;
            println!(
                "zoom {}..={}, years {:?}",
                config.map.min_zoom, config.map.max_zoom, config.years
            );
            for tier in table.iter() {
                println!(
                    "{:<10} zoom {:>2}..={:<2} size {:<9} count {:<4} \
                     separation {} (max {} attempts)",
                    tier.kind,
                    tier.min_zoom,
                    tier.max_zoom,
                    tier.target_size,
                    tier.target_count,
                    tier.min_separation,
                    tier.max_attempts(config.synthesis.attempts_per_zone),
                );
            }
        }
    }

    Ok(())
}
