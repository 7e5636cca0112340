//! # GadgetDeck User Interface Module
//!
//! The window is a collaborator of the input poller, never a dependency of it: it reads
//! published frames and indicator state from watch channels and sends on-screen keyboard
//! events through a bounded queue.
//!
//! ## Layout
//! - **Top Panel**: gadget presence, controller connection and the indicator lights
//! - **Central Panel**: live analog values and pressed digital actions
//! - **Bottom Panel**: on-screen keyboard
//!
//! Requests a 30fps refresh (`Duration::from_millis(33)`) so live values stay current
//! without input events.

pub mod common;
pub mod keyboard;

use eframe::egui::{self, Color32, RichText};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::mapping::actions::{AnalogAction, GamepadButton, MouseButton};

use self::common::{
    create_frame, status_light, Dashboard, Indicator, Indicators, KeyEvent, UiColors,
    UiReceivers,
};
use self::keyboard::OnScreenKeyboard;

/// Which gadget functions were found at startup, for the status bar
pub type GadgetPresence = [(&'static str, bool); 3];

pub struct GadgetDeckUi {
    receivers: UiReceivers,
    keyboard: OnScreenKeyboard,
    gadgets: GadgetPresence,
}

impl GadgetDeckUi {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        receivers: UiReceivers,
        key_sender: mpsc::Sender<KeyEvent>,
        gadgets: GadgetPresence,
    ) -> Self {
        cc.egui_ctx.set_theme(egui::Theme::Dark);
        Self {
            receivers,
            keyboard: OnScreenKeyboard::new(key_sender),
            gadgets,
        }
    }

    fn render_status(&self, ui: &mut egui::Ui, dashboard: &Dashboard, indicators: Indicators) {
        ui.horizontal_wrapped(|ui| {
            for (kind, present) in self.gadgets {
                let color = if present {
                    UiColors::ACTIVE
                } else {
                    UiColors::INACTIVE
                };
                ui.label(RichText::new(kind).color(color));
            }
            ui.separator();

            let (text, color) = match (&dashboard.active, dashboard.controllers.is_empty()) {
                (Some(active), _) => (format!("Active: {}", active.controller), UiColors::ACTIVE),
                (None, false) => ("Connecting...".to_string(), Color32::YELLOW),
                (None, true) => ("No controller".to_string(), UiColors::INACTIVE),
            };
            ui.label(RichText::new(text).color(color));
            if dashboard.controllers.len() > 1 {
                let others: Vec<String> = dashboard
                    .controllers
                    .iter()
                    .skip(1)
                    .map(|c| c.to_string())
                    .collect();
                ui.label(format!("(also {})", others.join(", ")));
            }
            ui.separator();

            for indicator in Indicator::ALL {
                status_light(ui, indicator.label(), indicators.get(indicator));
            }
        });
    }
}

fn render_live_view(ui: &mut egui::Ui, dashboard: &Dashboard) {
    let Some(active) = &dashboard.active else {
        ui.centered_and_justified(|ui| {
            ui.label(RichText::new("Waiting for a controller...").color(UiColors::DIM));
        });
        return;
    };

    create_frame(UiColors::INNER_BG, UiColors::BORDER).show(ui, |ui| {
        ui.label(format!(
            "{} - {}",
            active.controller,
            active.timestamp.format("%H:%M:%S%.3f")
        ));

        egui::Grid::new("analog_actions")
            .num_columns(3)
            .striped(true)
            .show(ui, |ui| {
                for action in AnalogAction::ALL {
                    let data = active.frame.analog(action);
                    ui.label(action.name());
                    ui.monospace(format!("{:+.2}", data.x));
                    ui.monospace(format!("{:+.2}", data.y));
                    ui.end_row();
                }
            });

        ui.separator();
        ui.horizontal_wrapped(|ui| {
            for button in GamepadButton::ALL {
                status_light(ui, button.name(), active.frame.gamepad(button));
            }
            for button in MouseButton::ALL {
                status_light(ui, button.name(), active.frame.mouse(button));
            }
        });
    });
}

impl eframe::App for GadgetDeckUi {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(Duration::from_millis(33));

        let dashboard = self.receivers.dashboard.borrow_and_update().clone();
        let indicators = *self.receivers.indicators.borrow_and_update();

        egui::TopBottomPanel::top("status_bar")
            .frame(create_frame(UiColors::MAIN_BG, UiColors::BORDER))
            .show(ctx, |ui| self.render_status(ui, &dashboard, indicators));

        egui::TopBottomPanel::bottom("keyboard")
            .show_separator_line(false)
            .show(ctx, |ui| self.keyboard.render(ui, indicators));

        egui::CentralPanel::default().show(ctx, |ui| render_live_view(ui, &dashboard));
    }
}
