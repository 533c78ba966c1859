use clap::Parser;
use segmentation::{CompositeAxis, ReadingDirection};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod assembly;
mod config;
mod error;
mod language;
mod postprocess;
mod segmentation;
mod server;

#[derive(Parser, Debug)]
#[command(name = "doclayout-server")]
#[command(about = "Layout segmentation and document assembly server for scanned documents")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "LAYOUT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "LAYOUT_PORT", default_value = "9393")]
    pub port: u16,

    /// Maximum upload size in bytes (default: 50MB)
    #[arg(long, env = "LAYOUT_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Pages wider than this are downscaled before segmentation
    #[arg(long, env = "LAYOUT_MAX_IMAGE_WIDTH", default_value = "2000")]
    pub max_image_width: u32,

    /// Pages taller than this are downscaled before segmentation
    #[arg(long, env = "LAYOUT_MAX_IMAGE_HEIGHT", default_value = "2000")]
    pub max_image_height: u32,

    /// Gaussian smoothing before thresholding (0 disables it)
    #[arg(long, env = "LAYOUT_SMOOTHING_SIGMA", default_value = "0.8")]
    pub smoothing_sigma: f32,

    /// Odd window size of the local mean threshold
    #[arg(long, env = "LAYOUT_THRESHOLD_WINDOW", default_value = "15")]
    pub threshold_window: u32,

    /// Constant subtracted from the local mean
    #[arg(long, env = "LAYOUT_THRESHOLD_OFFSET", default_value = "10")]
    pub threshold_offset: f32,

    /// Dilation kernel width
    #[arg(long, env = "LAYOUT_KERNEL_WIDTH", default_value = "25")]
    pub kernel_width: u32,

    /// Dilation kernel height
    #[arg(long, env = "LAYOUT_KERNEL_HEIGHT", default_value = "5")]
    pub kernel_height: u32,

    #[arg(long, env = "LAYOUT_DILATE_ITERATIONS", default_value = "1")]
    pub dilate_iterations: u32,

    /// Blocks must be wider than this
    #[arg(long, env = "LAYOUT_MIN_BLOCK_WIDTH", default_value = "80")]
    pub min_block_width: u32,

    /// Blocks must be taller than this
    #[arg(long, env = "LAYOUT_MIN_BLOCK_HEIGHT", default_value = "20")]
    pub min_block_height: u32,

    /// Disable rejection of red stamp regions
    #[arg(long, env = "LAYOUT_NO_STAMP_FILTER")]
    pub no_stamp_filter: bool,

    /// Share of stamp-coloured pixels above which a block is dropped
    #[arg(long, env = "LAYOUT_STAMP_THRESHOLD", default_value = "0.2")]
    pub stamp_threshold: f32,

    /// Default horizontal reading direction for blocks on the same row
    #[arg(long, env = "LAYOUT_READING_DIRECTION", value_enum, default_value = "ltr")]
    pub reading_direction: ReadingDirection,

    /// Default stacking axis of composite images
    #[arg(long, env = "LAYOUT_COMPOSITE_AXIS", value_enum, default_value = "vertical")]
    pub composite_axis: CompositeAxis,

    /// Seconds an untouched document session is kept
    #[arg(long, env = "LAYOUT_SESSION_TTL_SECS", default_value = "3600")]
    pub session_ttl_secs: u64,

    /// Seconds between expired session sweeps
    #[arg(long, env = "LAYOUT_SWEEP_INTERVAL_SECS", default_value = "60")]
    pub sweep_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from(args);

    tracing::info!("Starting doclayout-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Binding to {}:{}", config.host, config.port);
    tracing::debug!("Segmentation settings: {:?}", config.segmentation);

    server::run(config).await
}
