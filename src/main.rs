use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

mod audio;
mod capture;
mod client;
mod config;
mod dashboard;
mod diagnostics;
mod display;
mod error;
mod protocol;
mod video;

use capture::CaptureSession;
use client::ApiClient;
use config::AppConfig;
use diagnostics::MetricsCollector;
use display::Renderer;
use error::ErrorSink;

#[derive(Debug, Parser)]
#[command(name = "interview_capture", about = "Capture client for the interview assessment service")]
struct Args {
    /// Path to a TOML config file (defaults to the embedded config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without the dashboard, capturing until Ctrl-C
    #[arg(long)]
    headless: bool,

    /// Disable the microphone stream
    #[arg(long)]
    no_audio: bool,

    /// Disable the camera stream
    #[arg(long)]
    no_video: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    info!("Starting interview_capture");

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load_default()?,
    };

    let base_url = config.server.resolved_base_url();
    info!("uploading to {}", base_url);

    let client = ApiClient::new(base_url, config.upload.max_in_flight);
    let renderer = Renderer::new(config.upload.discard_stale);
    let sink = ErrorSink::new(32);
    let metrics = MetricsCollector::new(120);

    let session = CaptureSession::new();
    session.start();

    if !args.no_audio {
        session.register_task(audio::start_audio_capture(
            session.clone(),
            client.clone(),
            renderer.clone(),
            sink.clone(),
            config.audio.clone(),
        ));
    }
    if !args.no_video {
        session.register_task(video::start_video_capture(
            session.clone(),
            client.clone(),
            renderer.clone(),
            sink.clone(),
            config.video.clone(),
        ));
    }
    session.register_task(diagnostics::start_metrics_sampler(
        session.clone(),
        client.clone(),
        metrics.clone(),
    ));

    // On-demand flows (resume match, answer scoring, combined report) run on a
    // worker fed by the dashboard.
    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
    let worker = client::start_command_worker(cmd_rx, client.clone(), renderer.clone(), sink.clone());

    if args.headless {
        run_headless(&session).await;
    } else {
        #[cfg(feature = "ui")]
        {
            match dashboard::run_dashboard(
                session.clone(),
                client.clone(),
                renderer.clone(),
                sink.clone(),
                metrics.clone(),
                cmd_tx.clone(),
                config.resume.job_description.clone(),
            ) {
                Ok(_) => info!("dashboard closed cleanly"),
                Err(e) => eprintln!("dashboard error: {:#?}", e),
            }
        }
        #[cfg(not(feature = "ui"))]
        {
            let _ = dashboard::run_dashboard(
                session.clone(),
                client.clone(),
                renderer.clone(),
                sink.clone(),
                metrics.clone(),
                cmd_tx.clone(),
                config.resume.job_description.clone(),
            );
            run_headless(&session).await;
        }
    }

    session.stop();
    worker.abort();
    drop(cmd_tx);

    Ok(())
}

async fn run_headless(session: &CaptureSession) {
    info!("capture running; press Ctrl-C to stop");
    let _ = tokio::signal::ctrl_c().await;
    session.stop();
}
