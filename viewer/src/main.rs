mod app;
mod preview;
mod server;

use std::path::PathBuf;
use std::time::Duration;

use framelab_common::config::Config;
use framelab_pipeline::recorder::{check_ffmpeg_available, FfmpegSinkOpener, Recorder};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::app::App;
use crate::preview::PreviewPublisher;
use crate::server::ServerState;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        source = config.camera.source,
        bind = config.preview.bind,
        output = %config.output.dir.display(),
        "starting framelab"
    );

    if !check_ffmpeg_available().await {
        warn!("ffmpeg not found on PATH, recording will fail to start");
    }

    let mut source = match framelab_capture::open_source(&config.camera) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to open camera");
            eprintln!("Failed to open camera: {e}");
            std::process::exit(1);
        }
    };

    let timeout = Duration::from_secs(config.camera.startup_timeout_secs);
    let frame_size = match framelab_capture::wait_ready(source.as_ref(), timeout).await {
        Ok(size) => size,
        Err(e) => {
            source.close();
            error!(error = %e, "camera produced no frames");
            eprintln!("Camera produced no frames: {e}");
            std::process::exit(1);
        }
    };
    info!(width = frame_size.0, height = frame_size.1, "camera ready");

    let recorder = Recorder::new(
        Box::new(FfmpegSinkOpener::new(&config.recording)),
        config.recording.queue_depth,
    );
    let (publisher, preview) = PreviewPublisher::new(&config.preview);
    let (app, status) = App::new(&config, source, frame_size, recorder, Box::new(publisher));
    let (commands_tx, commands_rx) = mpsc::channel(64);

    let router = server::router(ServerState {
        commands: commands_tx,
        status,
        preview,
    });
    let listener = tokio::net::TcpListener::bind(&config.preview.bind)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to bind to {}: {e}", config.preview.bind);
            std::process::exit(1);
        });
    info!(addr = config.preview.bind, "preview server listening");

    let (server_done_tx, server_done) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "preview server failed");
        }
        let _ = server_done_tx.send(());
    });

    let shutdown = async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for ctrl-c");
                }
            }
            _ = server_done => warn!("preview server exited"),
        }
    };

    app.run(commands_rx, shutdown).await;
    server.abort();
    info!("framelab stopped");
}
