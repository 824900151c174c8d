use color_eyre::{eyre::eyre, Result};
use eframe::egui;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use streampad::config::StreamPadConfig;
use streampad::controller::foreground::ForegroundPump;
use streampad::controller::gilrs_backend::GilrsBackend;
use streampad::controller::poller::{InputPoller, PollerHandle};
use streampad::controller::session::{share_backend, StreamSession};
use streampad::notes::LaneLayout;
use streampad::ui::StreamPadApp;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = StreamPadConfig::load().await.unwrap_or_else(|e| {
        error!("Failed to load config, using defaults: {}", e);
        StreamPadConfig::default()
    });

    let backend = GilrsBackend::create().map_err(|e| eyre!("Failed to open gamepads: {}", e))?;
    let backend = share_backend(backend);

    let session = StreamSession::new(
        config.input.normalizer_settings(),
        config.notes,
        LaneLayout::for_window(config.display.width, config.display.height),
    )
    .shared();

    let mut pump = ForegroundPump::new(
        backend.clone(),
        session.clone(),
        config.input.background_polling,
        config.input.reconcile_interval(),
    );
    match pump.initial_scan() {
        Ok(Some(device)) => info!("Using device {}", device),
        Ok(None) => warn!("No controller connected, press R after plugging one in"),
        Err(e) => warn!("Initial device scan failed: {}", e),
    }

    let focus = Arc::new(AtomicBool::new(true));
    let poller = if config.input.background_polling {
        Some(PollerHandle::spawn(InputPoller::create(
            backend.clone(),
            session.clone(),
            focus.clone(),
            config.input.poller_settings(),
        )))
    } else {
        info!("Background polling disabled");
        None
    };

    info!("Starting overlay window");
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("StreamPad")
            .with_inner_size([config.display.width, config.display.height])
            .with_resizable(true),
        ..Default::default()
    };

    let display = config.display.clone();
    let app_session = session.clone();
    if let Err(e) = eframe::run_native(
        "StreamPad",
        native_options,
        Box::new(move |cc| {
            Ok(Box::new(StreamPadApp::new(
                cc,
                pump,
                app_session,
                focus,
                display,
            )))
        }),
    ) {
        error!("Overlay window failed: {}", e);
    }

    if let Some(poller) = poller {
        match poller.shutdown(config.input.shutdown_timeout()).await {
            Ok(stats) => info!("Poller stats: {:?}", stats),
            Err(e) => warn!("{}", e),
        }
    }

    if let Ok(session) = session.lock() {
        info!(
            "Session ended: {} presses, {:?}",
            session.store().total_presses(),
            session.stats()
        );
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
