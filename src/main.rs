pub mod config;
pub mod controller;
pub mod gadget;
pub mod mapping;
pub mod ui;

use crate::config::Config;
use crate::controller::gilrs_provider::GilrsProvider;
use crate::controller::poller::PollerHandle;
use crate::controller::provider::InputProvider;
use crate::gadget::hidg;
use crate::mapping::keyboard::forward_output_report;
use crate::ui::common::UiPublisher;
use crate::ui::GadgetDeckUi;
use color_eyre::{eyre::eyre, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let config = setup().await?;

    let Some(action_set) = config.active_set() else {
        return Err(eyre!(
            "Action set {} is not declared in [actions]",
            config.actions.action_set
        ));
    };
    info!(
        "Using action set {} ({} analog, {} digital bindings)",
        action_set.name,
        action_set.analog.len(),
        action_set.digital.len()
    );

    let (publisher, receivers) = UiPublisher::channel();

    let mut bridge = hidg::discover(&config.gadget);
    let gadgets = [
        (bridge.joystick.kind(), bridge.joystick.is_present()),
        (bridge.mouse.kind(), bridge.mouse.is_present()),
        (bridge.keyboard.kind(), bridge.keyboard.is_present()),
    ];

    let led_publisher = publisher.clone();
    let subscribed = bridge.keyboard.with(|keyboard| {
        keyboard.subscribe_output_report(Box::new(move |report| {
            forward_output_report(report, &led_publisher)
        }))
    });
    if let Some(Err(e)) = subscribed {
        warn!("Keyboard LED reports unavailable: {}", e);
    }

    let (key_sender, key_receiver) = mpsc::channel(config.poller.key_queue_depth.max(1));
    let cancel = CancellationToken::new();

    let actions = config.actions.clone();
    let poller = PollerHandle::spawn(
        move || {
            GilrsProvider::new(&actions).map(|provider| Box::new(provider) as Box<dyn InputProvider>)
        },
        config.actions.action_set.clone(),
        bridge,
        Box::new(publisher),
        key_receiver,
        config.poller.clone(),
        cancel,
    )
    .await
    .map_err(|e| eyre!("Failed to start input poller: {}", e))?;

    info!("Starting UI");
    let native_options = eframe::NativeOptions::default();
    let ui_result = eframe::run_native(
        "GadgetDeck",
        native_options,
        Box::new(move |cc| Ok(Box::new(GadgetDeckUi::new(cc, receivers, key_sender, gadgets)))),
    );

    info!("Window closed, stopping input poller");
    poller
        .shutdown()
        .map_err(|e| eyre!("Input poller did not stop cleanly: {}", e))?;
    ui_result.map_err(|e| eyre!("UI error: {}", e))?;

    info!("GadgetDeck stopped");
    Ok(())
}

async fn setup() -> Result<Config> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    let config = match Config::default_path() {
        Some(path) => Config::load_or_create(&path).await?,
        None => Config::default(),
    };
    setup_logging(&config)?;
    info!("GadgetDeck starting with gadget {}", config.gadget.name);
    Ok(config)
}

fn setup_logging(config: &Config) -> Result<()> {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| level.parse::<Level>().ok())
        .or_else(|| config.log_level.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| eyre!("Cannot open log file {}: {}", path.display(), e))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.pretty().init(),
    }
    Ok(())
}
