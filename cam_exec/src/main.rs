//! # Camera Executable
//!
//! This executable captures frames from the robot's camera and serves them to any number of
//! clients as an MJPEG stream over HTTP.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

// Internal
use cam_lib::{
    params::CamExecParams,
    relay::FrameRelay,
    source::run_producer,
    stream::{router, serve},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    let session = Session::new("cam_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    info!("Camera Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: CamExecParams =
        util::params::load("cam_exec.toml").wrap_err("Failed to load parameters")?;

    info!("Parameters loaded");

    // ---- INIT CAMERA ----

    let source = hw::init_source(&params).wrap_err("Failed to initialise the camera")?;

    info!(
        "Camera initialised, {}x{} at {} fps",
        params.stream_width, params.stream_height, params.frame_rate
    );

    // ---- INIT PRODUCER ----

    let relay = FrameRelay::new();
    let frames = relay.subscribe();
    let shutdown = Arc::new(AtomicBool::new(false));

    let producer = {
        let shutdown = shutdown.clone();
        tokio::task::spawn_blocking(move || run_producer(source, relay, &shutdown))
    };

    // ---- INIT SERVER ----

    let listener = tokio::net::TcpListener::bind(params.endpoint())
        .await
        .wrap_err("Failed to bind the stream server")?;

    info!(
        "Stream available at http://<host>:{}{}",
        params.port, params.stream_path
    );

    let app = router(frames, &params.stream_path);

    // ---- MAIN LOOP ----

    let shutdown_signal = {
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for the shutdown signal: {}", e);
            }
            info!("Shutdown requested");

            // Stopping the producer ends every open stream
            shutdown.store(true, Ordering::Relaxed);
        }
    };

    let res = serve(listener, app, shutdown_signal)
        .await
        .wrap_err("Stream server failed");

    // ---- SHUTDOWN ----

    shutdown.store(true, Ordering::Relaxed);
    if producer.await.is_err() {
        warn!("Frame producer panicked");
    }

    info!("End of execution");

    res
}

// ------------------------------------------------------------------------------------------------
// HARDWARE SELECTION
// ------------------------------------------------------------------------------------------------

/// V4L2 camera.
#[cfg(feature = "hw")]
mod hw {
    use cam_lib::{
        params::CamExecParams,
        source::{StreamError, V4l2Source},
    };

    pub fn init_source(params: &CamExecParams) -> Result<V4l2Source, StreamError> {
        V4l2Source::new(params)
    }
}

/// Generated test pattern.
#[cfg(not(feature = "hw"))]
mod hw {
    use cam_lib::{
        params::CamExecParams,
        source::{StreamError, TestPattern},
    };
    use log::warn;

    pub fn init_source(params: &CamExecParams) -> Result<TestPattern, StreamError> {
        warn!("Built without the `hw` feature, streaming a test pattern");
        Ok(TestPattern::new(params))
    }
}
