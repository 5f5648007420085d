use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixel_engine::BayerMatrix;
use pixelize::models::{
    available_cores, AppConfig, ColorMode, ConversionParams, ImageMetadata, InterpolationMode,
    JobStatus, PoolConfig, Quality, CONFIG_ENV_VAR,
};
use pixelize::services::{ImageCodec, ImageFormat, JobEventKind, PngCodec, TaskManager};

#[derive(Parser)]
#[command(name = "pixelize")]
#[command(about = "Convert images into palette-limited pixel art")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a PNG into pixel art
    Convert {
        /// Input PNG file path
        #[arg(short, long)]
        input: PathBuf,

        /// Output PNG file path
        #[arg(short, long)]
        output: PathBuf,

        /// Output size in percent of the input (1-200)
        #[arg(short, long, default_value_t = 100)]
        resize_factor: u32,

        /// nearest, bilinear, bicubic or pixel-art
        #[arg(long, default_value = "nearest")]
        interpolation: InterpolationMode,

        /// none, ordered-dither-bayer or floyd-steinberg
        #[arg(short, long, default_value = "none")]
        color_mode: ColorMode,

        /// Ordered dithering strength (0.1-5.0)
        #[arg(short, long, default_value_t = 1.0)]
        dithering_ratio: f32,

        /// fast, balanced or high-quality
        #[arg(short, long, default_value = "balanced")]
        quality: Quality,

        /// Palette size cap (2-256)
        #[arg(short, long, default_value_t = 16)]
        max_colors: usize,

        /// Re-compress the output with oxipng
        #[arg(long)]
        optimize: bool,

        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print a normalized Bayer threshold matrix
    Bayer {
        /// Matrix size, a power of two
        #[arg(short, long, default_value_t = 8)]
        size: usize,
    },
    /// Print the effective configuration as YAML
    Config {
        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Convert {
            input,
            output,
            resize_factor,
            interpolation,
            color_mode,
            dithering_ratio,
            quality,
            max_colors,
            optimize,
            config,
        }) => {
            let params = ConversionParams {
                resize_factor,
                interpolation,
                color_mode,
                dithering_ratio,
                quality,
                max_colors,
            };
            run_convert_command(&input, &output, params, optimize, config.as_deref()).await
        }
        Some(Commands::Bayer { size }) => run_bayer_command(size),
        Some(Commands::Config { config }) => {
            init_tracing("pixelize=warn");
            let config = AppConfig::load(config.as_deref());
            print!("{}", config.to_yaml_string()?);
            Ok(())
        }
        None => {
            run_status_command();
            Ok(())
        }
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();
}

/// Upload, convert and write one image through the task manager
async fn run_convert_command(
    input: &Path,
    output: &Path,
    params: ConversionParams,
    optimize: bool,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    init_tracing("pixelize=info");

    let config = AppConfig::load(config_path);
    let manager = Arc::new(TaskManager::new(&config));

    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let metadata = input
        .file_name()
        .map(|name| ImageMetadata::from_file_name(name.to_string_lossy()))
        .unwrap_or_default();
    let image_id = manager.store_uploaded_image(bytes, metadata).await?;
    let job_id = manager.create_task(&image_id, params).await?;
    let mut events = manager.subscribe(&job_id);

    let cancel = CancellationToken::new();
    let scheduler = tokio::spawn(Arc::clone(&manager).run(cancel.clone()));

    while let Some(event) = events.recv().await {
        match event.kind {
            JobEventKind::Progress { progress, step } => println!("[{progress:>3}%] {step}"),
            kind if kind.is_terminal() => break,
            _ => {}
        }
    }

    let job = manager.wait_for(&job_id).await?;
    cancel.cancel();
    scheduler.await?;

    let result = match (job.status, job.result) {
        (JobStatus::Completed, Some(result)) => result,
        _ => anyhow::bail!(
            "Conversion failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        ),
    };

    let pixels = Arc::clone(&result.pixels);
    let encoded = tokio::task::spawn_blocking(move || {
        let codec = if optimize {
            PngCodec::optimized()
        } else {
            PngCodec::new()
        };
        codec.encode(&pixels, ImageFormat::Png)
    })
    .await??;
    tokio::fs::write(output, &encoded)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("[100%] Completed");
    println!(
        "Wrote {} ({}x{}, {} bytes) in {}ms ({:?}, {} chunk(s))",
        output.display(),
        result.width,
        result.height,
        encoded.len(),
        result.processing_time_ms,
        result.execution_mode,
        result.chunks
    );
    println!("Palette: {}", result.palette.join(" "));
    Ok(())
}

fn run_bayer_command(size: usize) -> anyhow::Result<()> {
    let matrix = BayerMatrix::generate(size)?;
    println!("Bayer {size}x{size}");
    for row in matrix.threshold_rows() {
        let cells: Vec<String> = row.iter().map(|t| format!("{t:.4}")).collect();
        println!("  {}", cells.join(" "));
    }
    Ok(())
}

fn run_status_command() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let config_file = std::env::var(CONFIG_ENV_VAR).ok();
    let pool = PoolConfig::default();

    println!("Pixelize v{VERSION}");
    println!("Asynchronous pixel-art conversion\n");

    println!("Environment Variables:");
    println!(
        "  {CONFIG_ENV_VAR} = {}",
        config_file.as_deref().unwrap_or("(not set)")
    );

    println!("\nWorker Pool:");
    println!("  Detected cores = {}", available_cores());
    println!("  Max workers    = {}", pool.resolved_max_workers());
    println!("  Min workers    = {}", pool.resolved_min_workers());

    println!("\nCommands:");
    println!("  pixelize convert -i <in.png> -o <out.png>   Convert an image");
    println!("  pixelize bayer --size <n>                   Print a Bayer matrix");
    println!("  pixelize config                             Print effective configuration");
}
