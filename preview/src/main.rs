mod client;
mod compositor;
mod display_loop;
mod overlay;
mod probe;
mod scheduler;
mod sink;
mod source;
#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use frame_dream_common::config::Config;
use tokio::time::Instant;
use tracing::{error, info, warn};

use client::HttpTransform;
use compositor::Compositor;
use display_loop::{DisplayLoop, LoopControl, LoopExit};
use scheduler::CaptureScheduler;
use sink::JpegFileSink;
use source::MjpegSource;

fn load_config(path: &Path) -> Config {
    match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", path.display());
            std::process::exit(1);
        }
    }
}

fn init_tracing(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("probe") {
        let (Some(input), Some(output)) = (args.get(1), args.get(2)) else {
            eprintln!("usage: frame-dream-preview probe <input> <output> [config]");
            std::process::exit(2);
        };
        let config_path = args
            .get(3)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"));
        let config = load_config(&config_path);
        init_tracing(&config);

        match probe::run(Path::new(input), Path::new(output), &config.preview).await {
            Ok((width, height)) => println!("Saved {width}x{height} image to {output}"),
            Err(e) => {
                error!(error = %e, "probe failed");
                std::process::exit(1);
            }
        }
        return;
    }

    let config_path = args
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = load_config(&config_path);
    init_tracing(&config);

    info!(
        endpoint = config.preview.endpoint,
        camera = config.camera.url,
        interval_secs = config.preview.interval_secs,
        dispatch = ?config.preview.dispatch,
        output = config.display.output_path,
        "starting frame-dream preview"
    );

    let transform = match HttpTransform::new(&config.preview) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            error!(error = %e, "failed to build relay client");
            std::process::exit(1);
        }
    };

    let source = match MjpegSource::connect(&config.camera).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, url = config.camera.url, "failed to open camera");
            std::process::exit(1);
        }
    };

    let scheduler = CaptureScheduler::new(
        transform,
        config.preview.interval(),
        config.preview.dispatch,
        Instant::now(),
    );
    let compositor = match Compositor::from_config(&config.preview) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load overlay font");
            std::process::exit(1);
        }
    };
    let sink = JpegFileSink::new(&config.display.output_path, config.display.quality);
    let mut preview_loop = DisplayLoop::new(
        source,
        scheduler,
        compositor,
        sink,
        config.display.tick_period(),
        config.camera.frame_timeout(),
    );

    let control = Arc::new(LoopControl::default());
    {
        let control = control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping after this frame");
                control.request_quit();
            }
        });
    }
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::user_defined1()) {
            Ok(mut usr1) => {
                let control = control.clone();
                tokio::spawn(async move {
                    while usr1.recv().await.is_some() {
                        control.request_capture();
                    }
                });
            }
            Err(e) => warn!(error = %e, "SIGUSR1 capture trigger unavailable"),
        }
    }

    match preview_loop.run(&control).await {
        LoopExit::Quit => info!(
            ticks = preview_loop.ticks(),
            frames = preview_loop.sink().frames_written(),
            "preview stopped"
        ),
        LoopExit::CameraFailed(e) => {
            error!(error = %e, "camera stream ended");
            std::process::exit(1);
        }
    }
}
