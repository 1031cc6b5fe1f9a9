//! Snapcam binary: capture a burst of frames and save the last one.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use tracing_subscriber::EnvFilter;

use snapcam::discovery;
use snapcam::{Camera, CaptureConfig, CapturedFrame, V4L2Device};

#[derive(Parser)]
#[command(name = "snapcam")]
#[command(about = "Capture frames from a V4L2 camera, nudging brightness as it goes")]
#[command(version)]
struct Cli {
    /// Device node; discovered when omitted
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Buffers to request
    #[arg(short, long)]
    buffers: Option<u32>,

    /// Frames to capture
    #[arg(short, long)]
    frames: Option<u32>,

    /// Where to write the last frame (.pgm or .png)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print controls and formats, then exit
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut config = CaptureConfig::load(cli.config.as_deref()).wrap_err("loading settings")?;
    if cli.device.is_some() {
        config.device = cli.device;
    }
    if let Some(buffers) = cli.buffers {
        config.buffer_count = buffers;
    }
    if let Some(frames) = cli.frames {
        config.frame_count = frames;
    }
    if let Some(output) = cli.output {
        config.output = output;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_target(true)
        .init();

    let mut camera = open_camera(&config)?;
    if cli.list {
        list(&camera);
        return Ok(());
    }
    capture(&mut camera, &config)
}

fn open_camera(config: &CaptureConfig) -> Result<Camera<V4L2Device>> {
    let request = config.format_request()?;
    let camera = match &config.device {
        Some(path) => {
            let mut camera = Camera::open(path)?.with_format_request(request);
            camera
                .negotiate()
                .wrap_err_with(|| format!("negotiating {}", path.display()))?;
            camera
        }
        None => discovery::discover(&request).ok_or_else(|| eyre!("no camera found"))?,
    };
    Ok(camera.with_frame_timeout(config.frame_timeout()))
}

fn list(camera: &Camera<V4L2Device>) {
    if let Some(caps) = &camera.state().capabilities {
        println!("{} ({}) on {}", caps.card, caps.driver, caps.bus_info);
    }
    println!("Formats:");
    for entry in camera.formats().entries() {
        println!(
            "  [{}] {} {} ({})",
            entry.buffer_type, entry.index, entry.fourcc, entry.description
        );
    }
    println!("Controls:");
    for control in camera.controls().descriptors() {
        println!(
            "  {} {:<32} {}..{} step {} = {}",
            control.id, control.name, control.minimum, control.maximum, control.step, control.value
        );
        for entry in &control.menu {
            println!("      {}: {}", entry.index, entry.label);
        }
    }
}

fn capture(camera: &mut Camera<V4L2Device>, config: &CaptureConfig) -> Result<()> {
    camera.controls().log_controls();

    let granted = camera.allocate_buffers(config.buffer_count)?;
    camera.queue_all()?;
    match camera.capture_params() {
        Ok(params) => tracing::info!(
            capability = format_args!("{:#x}", params.capability),
            mode = params.capture_mode,
            interval = format_args!("{}/{}", params.time_per_frame.0, params.time_per_frame.1),
            "capture parameters"
        ),
        Err(err) => tracing::warn!(%err, "capture parameters unavailable"),
    }
    camera.start()?;

    let mut last = None;
    let captured = camera.run(config.frame_count, |frame, is_last| {
        tracing::debug!(sequence = frame.sequence, bytes = frame.bytes_used(), "frame");
        if is_last {
            last = Some(CapturedFrame::from(frame));
        }
        Ok(())
    })?;
    tracing::info!(captured, buffers = granted, "capture finished");

    camera.refresh_controls();
    camera.controls().log_controls();
    camera.stop()?;
    camera.release()?;

    let frame = last.ok_or_else(|| eyre!("no frame captured"))?;
    snapcam::sink::save_frame(&frame.as_frame(), &config.output)?;
    println!("Saved {}", config.output.display());
    Ok(())
}
