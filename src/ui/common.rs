//! # UI Common Components
//!
//! Types shared between the poller thread and the egui front end. The poller only ever
//! sees the [`UiSink`] trait; the window reads the other end of the same watch channels
//! through [`UiReceivers`].
//!
//! ## Data flow
//! ```text
//! poller ──publish / set_indicator──► UiPublisher ══watch══► GadgetDeckUi
//! poller ◄══════════mpsc<KeyEvent>══════════════════════════ GadgetDeckUi
//! LED reader ──set_indicator──► UiPublisher
//! ```
//! Watch channels keep only the latest value, so a slow window never back-pressures the
//! poller.

use chrono::{DateTime, Local};
use eframe::egui::{self, Color32, Frame, Stroke};
use serde::Serialize;
use tokio::sync::watch;

use crate::controller::provider::ControllerHandle;
use crate::gadget::KeyCode;
use crate::mapping::actions::ActionFrame;

/// On-screen keyboard event sent from the window to the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Press(KeyCode),
    Release(KeyCode),
}

/// Status lights shown in the window's status bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Indicator {
    Shift,
    Control,
    Alt,
    Gui,
    NumLock,
    CapsLock,
    ScrollLock,
}

impl Indicator {
    pub const ALL: [Indicator; 7] = [
        Indicator::Shift,
        Indicator::Control,
        Indicator::Alt,
        Indicator::Gui,
        Indicator::NumLock,
        Indicator::CapsLock,
        Indicator::ScrollLock,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Indicator::Shift => "Shift",
            Indicator::Control => "Ctrl",
            Indicator::Alt => "Alt",
            Indicator::Gui => "Gui",
            Indicator::NumLock => "Num",
            Indicator::CapsLock => "Caps",
            Indicator::ScrollLock => "Scroll",
        }
    }
}

/// On/off state of every [`Indicator`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Indicators(u8);

impl Indicators {
    pub fn get(&self, indicator: Indicator) -> bool {
        self.0 & (1 << indicator as u8) != 0
    }

    pub fn set(&mut self, indicator: Indicator, active: bool) {
        if active {
            self.0 |= 1 << indicator as u8;
        } else {
            self.0 &= !(1 << indicator as u8);
        }
    }
}

/// What the poller tells the window each tick
#[derive(Debug, Clone, PartialEq)]
pub enum FrameUpdate {
    Frame {
        controller: ControllerHandle,
        frame: ActionFrame,
        timestamp: DateTime<Local>,
    },
    /// Sent instead of a frame while no controller drives output
    Controllers(Vec<ControllerHandle>),
}

/// Latest live data for display
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dashboard {
    pub controllers: Vec<ControllerHandle>,
    pub active: Option<ActiveFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveFrame {
    pub controller: ControllerHandle,
    pub frame: ActionFrame,
    pub timestamp: DateTime<Local>,
}

impl Dashboard {
    pub fn apply(&mut self, update: FrameUpdate) {
        match update {
            FrameUpdate::Frame {
                controller,
                frame,
                timestamp,
            } => {
                if !self.controllers.contains(&controller) {
                    self.controllers.insert(0, controller);
                }
                self.active = Some(ActiveFrame {
                    controller,
                    frame,
                    timestamp,
                });
            }
            FrameUpdate::Controllers(controllers) => {
                if controllers.is_empty() {
                    self.active = None;
                }
                self.controllers = controllers;
            }
        }
    }
}

/// The window as seen from the poller and the LED reader
pub trait UiSink: Send {
    fn publish(&self, update: FrameUpdate);
    fn set_indicator(&self, indicator: Indicator, active: bool);
}

/// Production [`UiSink`]; cheap to clone into every producer thread
#[derive(Debug, Clone)]
pub struct UiPublisher {
    dashboard: watch::Sender<Dashboard>,
    indicators: watch::Sender<Indicators>,
}

/// Window side of [`UiPublisher`]
#[derive(Debug)]
pub struct UiReceivers {
    pub dashboard: watch::Receiver<Dashboard>,
    pub indicators: watch::Receiver<Indicators>,
}

impl UiPublisher {
    pub fn channel() -> (Self, UiReceivers) {
        let (dashboard_tx, dashboard_rx) = watch::channel(Dashboard::default());
        let (indicators_tx, indicators_rx) = watch::channel(Indicators::default());
        (
            Self {
                dashboard: dashboard_tx,
                indicators: indicators_tx,
            },
            UiReceivers {
                dashboard: dashboard_rx,
                indicators: indicators_rx,
            },
        )
    }
}

impl UiSink for UiPublisher {
    fn publish(&self, update: FrameUpdate) {
        self.dashboard.send_modify(|dashboard| dashboard.apply(update));
    }

    fn set_indicator(&self, indicator: Indicator, active: bool) {
        self.indicators.send_if_modified(|indicators| {
            let changed = indicators.get(indicator) != active;
            indicators.set(indicator, active);
            changed
        });
    }
}

/// Creates a styled frame with consistent visual parameters.
pub fn create_frame(bg_color: Color32, border_color: Color32) -> Frame {
    Frame::new()
        .stroke(Stroke::new(1.0, border_color))
        .fill(bg_color)
        .inner_margin(4)
        .outer_margin(2)
}

/// Dark theme palette
pub struct UiColors;

impl UiColors {
    pub const MAIN_BG: Color32 = Color32::from_rgb(30, 30, 30);
    pub const INNER_BG: Color32 = Color32::from_rgb(25, 25, 25);
    pub const BORDER: Color32 = Color32::from_rgb(60, 60, 60);
    /// Indicator lit, key held, controller connected
    pub const ACTIVE: Color32 = Color32::from_rgb(50, 200, 20);
    pub const INACTIVE: Color32 = Color32::from_rgb(200, 50, 20);
    pub const DIM: Color32 = Color32::from_rgb(90, 90, 90);
}

/// Small filled circle with a label, used for status lights
pub fn status_light(ui: &mut egui::Ui, label: &str, on: bool) {
    let color = if on { UiColors::ACTIVE } else { UiColors::DIM };
    ui.horizontal(|ui| {
        let (rect, _) = ui.allocate_exact_size(egui::vec2(10.0, 10.0), egui::Sense::hover());
        ui.painter().circle_filled(rect.center(), 5.0, color);
        ui.label(label);
    });
}

#[cfg(test)]
pub mod testing {
    //! Recording [`UiSink`] for core tests

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum UiCall {
        Publish(FrameUpdate),
        Indicator(Indicator, bool),
    }

    #[derive(Debug, Clone, Default)]
    pub struct RecordingUi {
        pub calls: Arc<Mutex<Vec<UiCall>>>,
    }

    impl RecordingUi {
        pub fn calls(&self) -> Vec<UiCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn indicator_calls(&self) -> Vec<(Indicator, bool)> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    UiCall::Indicator(indicator, on) => Some((indicator, on)),
                    UiCall::Publish(_) => None,
                })
                .collect()
        }

        pub fn published(&self) -> Vec<FrameUpdate> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    UiCall::Publish(update) => Some(update),
                    UiCall::Indicator(..) => None,
                })
                .collect()
        }
    }

    impl UiSink for RecordingUi {
        fn publish(&self, update: FrameUpdate) {
            self.calls.lock().unwrap().push(UiCall::Publish(update));
        }

        fn set_indicator(&self, indicator: Indicator, active: bool) {
            self.calls
                .lock()
                .unwrap()
                .push(UiCall::Indicator(indicator, active));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicators_are_independent_bits() {
        let mut indicators = Indicators::default();
        indicators.set(Indicator::Shift, true);
        indicators.set(Indicator::CapsLock, true);
        assert!(indicators.get(Indicator::Shift));
        assert!(indicators.get(Indicator::CapsLock));
        assert!(!indicators.get(Indicator::NumLock));

        indicators.set(Indicator::Shift, false);
        assert!(!indicators.get(Indicator::Shift));
        assert!(indicators.get(Indicator::CapsLock));
    }

    #[test]
    fn publisher_feeds_the_receivers() {
        let (publisher, mut receivers) = UiPublisher::channel();

        publisher.publish(FrameUpdate::Controllers(vec![ControllerHandle(1)]));
        publisher.publish(FrameUpdate::Frame {
            controller: ControllerHandle(1),
            frame: ActionFrame::default(),
            timestamp: Local::now(),
        });
        publisher.set_indicator(Indicator::NumLock, true);

        assert!(receivers.dashboard.has_changed().unwrap());
        let dashboard = receivers.dashboard.borrow_and_update().clone();
        assert_eq!(dashboard.controllers, vec![ControllerHandle(1)]);
        assert_eq!(
            dashboard.active.map(|active| active.controller),
            Some(ControllerHandle(1))
        );
        assert!(receivers.indicators.borrow().get(Indicator::NumLock));
    }

    #[test]
    fn empty_controller_list_clears_the_active_frame() {
        let mut dashboard = Dashboard::default();
        dashboard.apply(FrameUpdate::Frame {
            controller: ControllerHandle(2),
            frame: ActionFrame::default(),
            timestamp: Local::now(),
        });
        dashboard.apply(FrameUpdate::Controllers(vec![]));
        assert_eq!(dashboard, Dashboard::default());
    }

    #[test]
    fn unchanged_indicator_does_not_notify() {
        let (publisher, mut receivers) = UiPublisher::channel();
        publisher.set_indicator(Indicator::Alt, false);
        assert!(!receivers.indicators.has_changed().unwrap());
        publisher.set_indicator(Indicator::Alt, true);
        assert!(receivers.indicators.has_changed().unwrap());
        assert!(receivers.indicators.borrow_and_update().get(Indicator::Alt));
    }
}
