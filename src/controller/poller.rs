//! Input poller - the bridge's control loop
//!
//! Every tick drains on-screen key events, advances the provider, tracks controller
//! presence and, while a controller is connected, turns one frame of action data into
//! joystick and mouse reports. The poller thread is the only owner of the gadget sinks.

use chrono::Local;
use statum::{machine, state};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PollerConfig;
use crate::controller::connection::{ConnectionMonitor, Presence};
use crate::controller::provider::{ControllerHandle, InputProvider, ProviderError};
use crate::gadget::GadgetBridge;
use crate::mapping::actions::{ActionFrame, ActionMapper, AnalogAction, GamepadButton, MouseButton};
use crate::mapping::keyboard::ModifierStateMachine;
use crate::mapping::MappingError;
use crate::ui::common::{FrameUpdate, KeyEvent, UiSink};

const FETCHES_PER_FRAME: usize =
    AnalogAction::ALL.len() + GamepadButton::ALL.len() + MouseButton::ALL.len();

#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Failed to spawn poller thread: {0}")]
    Spawn(std::io::Error),

    #[error("Poller thread exited before finishing initialization")]
    InitAborted,

    #[error("Poller thread panicked")]
    Panicked,
}

#[state]
#[derive(Debug, Clone)]
pub enum PollerState {
    Idle,
    Running,
    Stopped,
}

/// Throughput counter logged every ten seconds
#[derive(Debug)]
struct TickStats {
    ticks: u64,
    since: chrono::DateTime<Local>,
}

impl TickStats {
    const LOG_INTERVAL_SECS: i64 = 10;

    fn new() -> Self {
        Self {
            ticks: 0,
            since: Local::now(),
        }
    }

    fn record(&mut self, controllers: usize) {
        self.ticks += 1;
        let now = Local::now();
        let interval = chrono::Duration::seconds(Self::LOG_INTERVAL_SECS);
        if now - self.since > interval {
            info!(
                "Input poller stats: {} ticks in last {} seconds (avg {:.2}/sec), {} controller(s)",
                self.ticks,
                interval.num_seconds(),
                self.ticks as f64 / interval.num_seconds() as f64,
                controllers
            );
            self.ticks = 0;
            self.since = now;
        }
    }
}

#[machine]
pub struct InputPoller<S: PollerState> {
    provider: Box<dyn InputProvider>,
    mapper: ActionMapper,
    monitor: ConnectionMonitor,
    bridge: GadgetBridge,
    modifiers: ModifierStateMachine,
    ui: Box<dyn UiSink>,
    key_events: mpsc::Receiver<KeyEvent>,
    // Last successfully fetched value of every action
    frame: ActionFrame,
    tick_interval: Duration,
    stats: TickStats,
}

impl InputPoller<Idle> {
    /// Resolves every action handle; an unknown action set or action name is fatal
    pub fn create(
        provider: Box<dyn InputProvider>,
        action_set: &str,
        bridge: GadgetBridge,
        ui: Box<dyn UiSink>,
        key_events: mpsc::Receiver<KeyEvent>,
        config: &PollerConfig,
    ) -> Result<Self, PollerError> {
        let mapper = ActionMapper::resolve(provider.as_ref(), action_set)?;
        let monitor = ConnectionMonitor::new(mapper.action_set(), config.revalidate_interval());
        debug!("Creating input poller with settings: {:?}", config);

        Ok(Self::new(
            provider,
            mapper,
            monitor,
            bridge,
            ModifierStateMachine::new(),
            ui,
            key_events,
            ActionFrame::default(),
            config.tick_interval(),
            TickStats::new(),
        ))
    }

    pub fn start(self) -> InputPoller<Running> {
        info!(
            "Input poller running (tick {:?}, joystick: {}, mouse: {}, keyboard: {})",
            self.tick_interval,
            self.bridge.joystick.is_present(),
            self.bridge.mouse.is_present(),
            self.bridge.keyboard.is_present()
        );
        self.transition()
    }
}

impl InputPoller<Running> {
    /// Runs ticks until `cancel` fires
    pub fn run(mut self, cancel: &CancellationToken) -> InputPoller<Stopped> {
        while !cancel.is_cancelled() {
            let started = Instant::now();
            self.tick(started);
            self.stats.record(self.monitor.controllers().len());

            if let Some(rest) = self.tick_interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        info!("Input poller stopping");
        self.transition()
    }

    pub fn tick(&mut self, now: Instant) {
        self.drain_key_events();
        self.provider.run_frame();

        match self.monitor.tick(self.provider.as_mut(), now) {
            Presence::Searching(controllers) | Presence::Acquired(controllers) => {
                self.ui.publish(FrameUpdate::Controllers(controllers));
            }
            Presence::Lost => self.release_controller(),
            Presence::Active(controller) => self.forward_frame(controller),
        }
    }

    fn drain_key_events(&mut self) {
        while let Ok(event) = self.key_events.try_recv() {
            self.modifiers
                .handle(event, &mut self.bridge.keyboard, self.ui.as_ref());
        }
    }

    fn forward_frame(&mut self, controller: ControllerHandle) {
        let failures = self.fetch_frame(controller);
        if failures == FETCHES_PER_FRAME {
            self.monitor.mark_lost();
            self.release_controller();
            return;
        }
        if failures > 0 {
            debug!(
                "{} of {} action fetches failed on {}, keeping previous values",
                failures, FETCHES_PER_FRAME, controller
            );
        }

        self.ui.publish(FrameUpdate::Frame {
            controller,
            frame: self.frame.clone(),
            timestamp: Local::now(),
        });
        self.send_joystick();
        self.send_mouse();
    }

    /// Updates the cached frame in place; returns how many fetches failed
    fn fetch_frame(&mut self, controller: ControllerHandle) -> usize {
        let mut failures = 0;
        for action in AnalogAction::ALL {
            match self
                .provider
                .analog_action_data(controller, self.mapper.analog(action))
            {
                Some(data) => self.frame.analog[action.index()] = data,
                None => failures += 1,
            }
        }
        for button in GamepadButton::ALL {
            match self
                .provider
                .digital_action_data(controller, self.mapper.gamepad(button))
            {
                Some(pressed) => self.frame.gamepad[button.index()] = pressed,
                None => failures += 1,
            }
        }
        for button in MouseButton::ALL {
            match self
                .provider
                .digital_action_data(controller, self.mapper.mouse(button))
            {
                Some(pressed) => self.frame.mouse[button.index()] = pressed,
                None => failures += 1,
            }
        }
        failures
    }

    // Host Y axes point down
    fn send_joystick(&mut self) {
        let frame = &self.frame;
        self.bridge.joystick.with(|joystick| {
            let left = frame.analog(AnalogAction::JoyLeft);
            let right = frame.analog(AnalogAction::JoyRight);
            joystick.set_joystick(0, left.x, -left.y);
            joystick.set_joystick(1, right.x, -right.y);
            joystick.set_trigger(0, frame.analog(AnalogAction::TrigLeft).x);
            joystick.set_trigger(1, frame.analog(AnalogAction::TrigRight).x);
            for button in GamepadButton::ALL {
                joystick.set_button(button.index(), frame.gamepad(button));
            }
        });
        self.bridge.joystick.commit();
    }

    fn send_mouse(&mut self) {
        let frame = &self.frame;
        self.bridge.mouse.with(|mouse| {
            let motion = frame.analog(AnalogAction::Mouse);
            mouse.move_by(motion.x, motion.y);
            for button in MouseButton::ALL {
                mouse.set_button(button.index(), frame.mouse(button));
            }
        });
        self.bridge.mouse.commit();
    }

    fn release_controller(&mut self) {
        warn!("Controller lost, releasing joystick and mouse");
        self.frame = ActionFrame::default();
        self.bridge.neutral_pointer();
        self.ui.publish(FrameUpdate::Controllers(Vec::new()));
    }
}

impl InputPoller<Stopped> {
    /// Leaves the host with nothing pressed, then closes every device
    pub fn shutdown(mut self) {
        self.bridge.release_all();
        self.modifiers.clear_indicators(self.ui.as_ref());
        self.ui.publish(FrameUpdate::Controllers(Vec::new()));
        info!("Input poller stopped, releasing gadget devices");
    }
}

/// Owner of the poller thread
pub struct PollerHandle {
    thread: std::thread::JoinHandle<()>,
    cancel: CancellationToken,
}

impl PollerHandle {
    /// Spawns the poller thread and waits until the provider and action handles are ready.
    ///
    /// The provider is built on the poller thread itself because gamepad backends are
    /// generally not `Send`.
    pub async fn spawn<F>(
        make_provider: F,
        action_set: String,
        bridge: GadgetBridge,
        ui: Box<dyn UiSink>,
        key_events: mpsc::Receiver<KeyEvent>,
        config: PollerConfig,
        cancel: CancellationToken,
    ) -> Result<Self, PollerError>
    where
        F: FnOnce() -> Result<Box<dyn InputProvider>, ProviderError> + Send + 'static,
    {
        let (init_tx, init_rx) = oneshot::channel::<Result<(), PollerError>>();
        let token = cancel.clone();

        info!("Spawning input poller thread");
        let thread = std::thread::Builder::new()
            .name("input-poller".to_string())
            .spawn(move || {
                let created = make_provider()
                    .map_err(PollerError::from)
                    .and_then(|provider| {
                        InputPoller::create(provider, &action_set, bridge, ui, key_events, &config)
                    });
                let poller = match created {
                    Ok(poller) => {
                        let _ = init_tx.send(Ok(()));
                        poller
                    }
                    Err(e) => {
                        error!("Failed to initialize input poller: {}", e);
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                poller.start().run(&token).shutdown();
            })
            .map_err(PollerError::Spawn)?;

        match init_rx.await {
            Ok(Ok(())) => Ok(Self { thread, cancel }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(PollerError::InitAborted)
            }
        }
    }

    /// Cancels the loop and waits for the neutral reports to be written
    pub fn shutdown(self) -> Result<(), PollerError> {
        self.cancel.cancel();
        self.thread.join().map_err(|_| PollerError::Panicked)
    }
}
