use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;

use virtual_desktop::config::CameraSource;
use virtual_desktop::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "virtual-desktop", about = "Curved pass-through virtual desktop for a head-mounted display")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Side-by-side stereo image to show instead of the camera feed
    #[arg(long)]
    stereo_image: Option<PathBuf>,

    /// Run without a pass-through camera
    #[arg(long, conflicts_with = "stereo_image")]
    no_camera: bool,

    /// Log filter, e.g. "debug" or "virtual_desktop=trace" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("virtual_desktop=info"));
    if let Some(filter) = &cli.log_level {
        logger.parse_filters(filter);
    }
    logger.init();

    info!("virtual-desktop v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(path) = cli.stereo_image {
        config.camera.source = CameraSource::StereoImage;
        config.camera.image_path = Some(path);
    }
    if cli.no_camera {
        config.camera.source = CameraSource::None;
    }

    virtual_desktop::run(config)
}
