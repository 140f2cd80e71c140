// media_probe - probe containers, extract cover thumbnails, analyze palettes

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use media_probe::{
    analyze_picture_color_from_path, available_codecs, MediaBackend, MediaProbe, ProbeConfig,
};

#[derive(Parser)]
#[command(name = "media_probe", version, about = "Media container probe and cover thumbnailer")]
struct Args {
    /// Open/read timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Bytes read while detecting the container format
    #[arg(long)]
    probe_size: Option<u64>,

    /// Extra HTTP headers ("Name: value\r\n" lines)
    #[arg(long, default_value = "")]
    headers: String,

    /// Shorter thumbnail side in pixels
    #[arg(long)]
    thumb_min_side: Option<i32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the container/stream description as JSON
    Info {
        locator: String,
        /// Also extract the cover picture to this path
        #[arg(long)]
        picture: Option<PathBuf>,
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },
    /// Extract the cover picture only
    Picture {
        locator: String,
        picture: PathBuf,
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },
    /// Print the color palette of a still image as JSON
    Palette { path: PathBuf },
    /// List the audio/video codecs of the backend
    Codecs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    #[cfg(feature = "ffmpeg")]
    let backend = media_probe::FfmpegBackend::new();
    #[cfg(not(feature = "ffmpeg"))]
    let backend = media_probe::StillImageBackend::new();

    run(&backend, args)
}

fn path_arg(path: &Option<PathBuf>) -> String {
    path.as_ref().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default()
}

fn report_log(log: Option<String>) {
    if let Some(log) = log {
        warn!("Diagnostic log:\n{}", log);
    }
}

fn run<B: MediaBackend>(backend: &B, args: Args) -> Result<()> {
    let mut config = ProbeConfig::default();
    config.open.timeout = Duration::from_secs(args.timeout_secs);
    if let Some(probe_size) = args.probe_size {
        config.open.probe_size = probe_size;
    }
    if let Some(side) = args.thumb_min_side {
        if side <= 0 {
            bail!("--thumb-min-side must be positive, got {}", side);
        }
        config.picture.thumb_min_side = side;
    }
    let probe = MediaProbe::new(backend, config);

    match args.command {
        Command::Info { locator, picture, thumbnail } => {
            let outcome = probe.media_info(&locator, &args.headers, &path_arg(&picture), &path_arg(&thumbnail));
            report_log(outcome.log);

            let Some(json) = outcome.json else {
                bail!("Cannot open {}", locator);
            };
            let value: serde_json::Value = serde_json::from_str(&json).context("Invalid info JSON")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            info!("Picture tier: {}", outcome.status);
        }
        Command::Picture { locator, picture, thumbnail } => {
            let picture = picture.to_string_lossy().into_owned();
            let outcome = probe.media_picture(&locator, &args.headers, &picture, &path_arg(&thumbnail));
            report_log(outcome.log);
            println!("{}", outcome.tier.code());
        }
        Command::Palette { path } => {
            let outcome = analyze_picture_color_from_path(&path);
            report_log(outcome.log.clone());

            let Some(palette) = outcome.palette else {
                bail!("Cannot analyze {}", path.display());
            };
            println!("{}", serde_json::to_string_pretty(&palette.to_json())?);
        }
        Command::Codecs => {
            let codecs = available_codecs(backend);
            println!("{}", serde_json::to_string_pretty(&codecs)?);
        }
    }

    Ok(())
}
