use clap::{Parser, Subcommand};
use cli::{ExtractJob, JobFile, WandJob};
use color_eyre::eyre::{Result, eyre};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};
use zoning::{CancelToken, ZoneCommand, ZoneCommandOutput, ZoneManager};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every zone of a map using a job file
    Extract {
        /// Path to the TOML or JSON job file
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides the job's image path
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Overrides the job's GeoJSON output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Select one region around a clicked pixel
    Wand {
        /// Path to the map image
        #[arg(short, long)]
        image: Option<PathBuf>,
        #[arg(short, long)]
        x: Option<i64>,
        #[arg(short, long)]
        y: Option<i64>,
        /// Optional TOML or JSON job file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write a job file with default extraction settings
    GenerateConfig {
        /// Path to the map image
        #[arg(short, long)]
        image: PathBuf,
        /// Where extraction will write its GeoJSON
        #[arg(short, long)]
        output: PathBuf,
        /// Path to save the generated job file (.toml or .json)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract { config, image, output } => {
            let mut job = ExtractJob::from_file(&config)?;
            if let Some(image) = image {
                job.image = image.to_string_lossy().to_string();
            }
            if let Some(output) = output {
                job.output = output.to_string_lossy().to_string();
            }
            extract(job).await?;
        }
        Commands::Wand { image, x, y, config } => {
            let job = wand_job(image, x, y, config.as_deref())?;
            wand(job).await?;
        }
        Commands::GenerateConfig { image, output, config } => {
            let job = ExtractJob::skeleton(
                image.to_string_lossy(),
                output.to_string_lossy(),
            );
            job.to_file(&config)?;
            info!("Job file saved to: {:?}", config);
        }
    }

    Ok(())
}

fn wand_job(
    image: Option<PathBuf>,
    x: Option<i64>,
    y: Option<i64>,
    config: Option<&Path>,
) -> Result<WandJob> {
    let mut job = match config {
        Some(path) => Some(WandJob::from_file(path)?),
        None => None,
    };

    if let Some(job) = job.as_mut() {
        if let Some(image) = &image {
            job.image = image.to_string_lossy().to_string();
        }
        job.x = x.unwrap_or(job.x);
        job.y = y.unwrap_or(job.y);
    }

    match job {
        Some(job) => Ok(job),
        None => Ok(WandJob {
            image: image
                .ok_or_else(|| eyre!("--image is required without a job file"))?
                .to_string_lossy()
                .to_string(),
            x: x.ok_or_else(|| eyre!("--x is required without a job file"))?,
            y: y.ok_or_else(|| eyre!("--y is required without a job file"))?,
            settings: Default::default(),
            existing_polygons: Vec::new(),
        }),
    }
}

/// Run a command on a blocking thread, cancelling it on Ctrl+C.
async fn run(manager: ZoneManager, command: ZoneCommand) -> Result<ZoneCommandOutput> {
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let mut task = tokio::task::spawn_blocking(move || manager.execute_with_cancel(command, &worker_cancel));

    tokio::select! {
        result = &mut task => Ok(result??),
        _ = tokio::signal::ctrl_c() => {
            warn!("Received Ctrl+C, cancelling");
            cancel.cancel();
            Ok(task.await??)
        }
    }
}

async fn extract(job: ExtractJob) -> Result<()> {
    info!("Extraction job: {:?}", job);

    let mut manager = ZoneManager::new();
    manager.load_image(&job.image)?;

    let command = ZoneCommand::ExtractZones {
        settings: job.settings,
        crop: job.crop,
        georeference: job.georeference,
    };
    let ZoneCommandOutput::Zones(zones) = run(manager, command).await? else {
        return Err(eyre!("extraction returned an unexpected output"));
    };

    if let Some(parent) = Path::new(&job.output).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    zones.save_geojson(&job.output)?;

    info!(
        "Extracted {} zones ({}) -> {}",
        zones.len(),
        zones.metadata.coordinate_system,
        job.output
    );
    Ok(())
}

async fn wand(job: WandJob) -> Result<()> {
    info!("Magic wand at ({}, {}) on {}", job.x, job.y, job.image);

    let mut manager = ZoneManager::new();
    manager.load_image(&job.image)?;

    let command = ZoneCommand::MagicWand {
        x: job.x,
        y: job.y,
        settings: job.settings,
        existing_polygons: job.existing_polygons,
    };
    let ZoneCommandOutput::Wand(response) = run(manager, command).await? else {
        return Err(eyre!("magic wand returned an unexpected output"));
    };

    if !response.success {
        warn!("Selection rejected: {}", response.error.as_deref().unwrap_or_default());
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
