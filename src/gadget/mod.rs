//! Emulated USB HID peripherals
//!
//! Each device kind is a trait so the poller can be driven against recording sinks in
//! tests. A [`Device`] wraps a sink that may not exist on this gadget; every operation on
//! an absent device is a no-op.
//!
//! ```text
//! InputPoller ──► GadgetBridge ──┬─► Device<dyn JoystickSink> ──► /dev/hidgN
//!                                ├─► Device<dyn MouseSink>
//!                                └─► Device<dyn KeyboardSink> ◄── LED output reports
//! ```

pub mod error;
pub mod hidg;
pub mod keycode;
pub mod report;

pub use error::GadgetError;
pub use keycode::KeyCode;

use tracing::{debug, info, warn};

/// Callback invoked with every raw output report the host sends to the keyboard
pub type OutputReportCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Common part of every sink: commit staged state, or stage the neutral state
pub trait ReportSink: Send {
    /// Writes the staged state as one report
    fn flush(&mut self) -> Result<(), GadgetError>;

    /// Stages the neutral report: centered axes, nothing pressed
    fn reset(&mut self);
}

pub trait JoystickSink: ReportSink {
    fn set_joystick(&mut self, index: usize, x: f32, y: f32);
    fn set_trigger(&mut self, index: usize, value: f32);
    fn set_button(&mut self, index: usize, pressed: bool);
}

pub trait MouseSink: ReportSink {
    fn move_by(&mut self, dx: f32, dy: f32);
    fn set_button(&mut self, index: usize, pressed: bool);
}

pub trait KeyboardSink: ReportSink {
    fn press(&mut self, key: KeyCode);
    fn release(&mut self, key: KeyCode);
    fn is_pressed(&self, key: KeyCode) -> bool;

    /// Starts delivering host output reports (LED state) to `callback`
    fn subscribe_output_report(&mut self, callback: OutputReportCallback)
        -> Result<(), GadgetError>;
}

/// A sink that may be absent for the lifetime of the process
pub struct Device<T: ?Sized> {
    kind: &'static str,
    sink: Option<Box<T>>,
    failing: bool,
}

impl<T: ReportSink + ?Sized> Device<T> {
    pub fn absent(kind: &'static str) -> Self {
        Self {
            kind,
            sink: None,
            failing: false,
        }
    }

    pub fn present(kind: &'static str, sink: Box<T>) -> Self {
        Self {
            kind,
            sink: Some(sink),
            failing: false,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn is_present(&self) -> bool {
        self.sink.is_some()
    }

    /// Runs `f` against the sink, if there is one
    pub fn with<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.sink.as_deref_mut().map(f)
    }

    /// Read-only access; `None` when absent
    pub fn get(&self) -> Option<&T> {
        self.sink.as_deref()
    }

    /// Flushes the staged report. Failures are logged, never propagated: the host may
    /// simply not be listening yet.
    pub fn commit(&mut self) {
        let Some(sink) = self.sink.as_deref_mut() else {
            return;
        };
        match sink.flush() {
            Ok(()) => {
                if self.failing {
                    info!("{} device writable again", self.kind);
                    self.failing = false;
                }
            }
            Err(e) if self.failing => debug!("{} flush failed: {}", self.kind, e),
            Err(e) => {
                warn!("{} flush failed: {}", self.kind, e);
                self.failing = true;
            }
        }
    }

    /// Stages and flushes the neutral report
    pub fn neutral(&mut self) {
        if self.with(|sink| sink.reset()).is_some() {
            debug!("Flushing neutral {} report", self.kind);
            self.commit();
        }
    }
}

/// Owner of the three optional sinks; lives on the poller thread
pub struct GadgetBridge {
    pub joystick: Device<dyn JoystickSink>,
    pub mouse: Device<dyn MouseSink>,
    pub keyboard: Device<dyn KeyboardSink>,
}

impl GadgetBridge {
    pub fn new(
        joystick: Device<dyn JoystickSink>,
        mouse: Device<dyn MouseSink>,
        keyboard: Device<dyn KeyboardSink>,
    ) -> Self {
        Self {
            joystick,
            mouse,
            keyboard,
        }
    }

    /// Releases everything the controller was holding
    pub fn neutral_pointer(&mut self) {
        self.joystick.neutral();
        self.mouse.neutral();
    }

    /// Neutral reports on all devices; called once on shutdown
    pub fn release_all(&mut self) {
        self.neutral_pointer();
        self.keyboard.neutral();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn absent_device_is_a_no_op() {
        let mut device: Device<dyn JoystickSink> = Device::absent("Joystick");
        assert!(!device.is_present());
        assert_eq!(device.with(|sink| sink.set_button(0, true)), None);
        device.commit();
        device.neutral();
    }

    #[test]
    fn neutral_resets_then_flushes() {
        let (sink, shared) = RecordingJoystick::new();
        let mut device: Device<dyn JoystickSink> = Device::present("Joystick", Box::new(sink));
        device.with(|sink| sink.set_button(3, true));
        device.neutral();

        let recording = shared.lock().unwrap();
        assert_eq!(
            recording.calls,
            vec![SinkCall::Button(3, true), SinkCall::Reset, SinkCall::Flush]
        );
        assert_eq!(recording.reports, vec![vec![0; 9]]);
    }

    #[test]
    fn flush_failures_do_not_propagate_and_recover() {
        let (sink, shared) = RecordingMouse::new(1.0);
        let mut device: Device<dyn MouseSink> = Device::present("Mouse", Box::new(sink));

        shared.lock().unwrap().fail_flush = true;
        device.commit();
        device.commit();
        assert!(device.failing);

        shared.lock().unwrap().fail_flush = false;
        device.commit();
        assert!(!device.failing);
        assert_eq!(shared.lock().unwrap().flushes(), 3);
    }

    #[test]
    fn release_all_touches_every_present_device() {
        let (joystick, joystick_rec) = RecordingJoystick::new();
        let (keyboard, keyboard_rec) = RecordingKeyboard::new();
        let mut bridge = GadgetBridge::new(
            Device::present("Joystick", Box::new(joystick)),
            Device::absent("Mouse"),
            Device::present("Keyboard", Box::new(keyboard)),
        );

        bridge.release_all();
        assert_eq!(joystick_rec.lock().unwrap().flushes(), 1);
        assert_eq!(keyboard_rec.lock().unwrap().reports, vec![vec![0; 8]]);
    }
}
