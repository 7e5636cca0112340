//! Sinks backed by the kernel's `hidg` character devices
//!
//! A gadget function `hid.<name>` configured through configfs exposes its device number
//! in `functions/hid.<name>/dev`. The node name is looked up through sysfs, the same
//! way udev would name it.

use nix::fcntl::{FcntlArg, OFlag};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::GadgetConfig;
use crate::gadget::report::{JoystickReport, KeyboardReport, MouseReport};
use crate::gadget::{
    Device, GadgetBridge, GadgetError, JoystickSink, KeyCode, KeyboardSink, MouseSink,
    OutputReportCallback, ReportSink,
};

pub const JOYSTICK_FUNCTION: &str = "joystick";
pub const MOUSE_FUNCTION: &str = "mouse";
pub const KEYBOARD_FUNCTION: &str = "keyboard";

/// Largest output report read from a node; the keyboard only sends one byte
const OUTPUT_REPORT_BUFFER: usize = 64;

/// Idle wait of the output report reader between empty reads
const OUTPUT_REPORT_POLL: Duration = Duration::from_millis(20);

/// View of one gadget's functions in configfs
#[derive(Debug, Clone)]
pub struct GadgetFunctions {
    functions_dir: PathBuf,
    sysfs_char_root: PathBuf,
    dev_root: PathBuf,
}

impl GadgetFunctions {
    pub fn new(config: &GadgetConfig) -> Self {
        Self {
            functions_dir: config.configfs_root.join(&config.name).join("functions"),
            sysfs_char_root: config.sysfs_char_root.clone(),
            dev_root: config.dev_root.clone(),
        }
    }

    fn function_dir(&self, function: &str) -> PathBuf {
        self.functions_dir.join(format!("hid.{}", function))
    }

    pub fn function_exists(&self, function: &str) -> bool {
        self.function_dir(function).is_dir()
    }

    /// Resolves `/dev/hidgN` for a function
    pub fn device_node(&self, function: &str) -> Result<PathBuf, GadgetError> {
        if !self.function_exists(function) {
            return Err(GadgetError::MissingFunction(function.to_string()));
        }

        let dev_path = self.function_dir(function).join("dev");
        let dev = read_attribute(&dev_path)?;
        let devnum = dev.trim();
        let valid = devnum
            .split_once(':')
            .is_some_and(|(major, minor)| major.parse::<u32>().is_ok() && minor.parse::<u32>().is_ok());
        if !valid {
            return Err(GadgetError::Malformed {
                path: dev_path,
                reason: format!("expected major:minor, got '{}'", devnum),
            });
        }

        let uevent_path = self.sysfs_char_root.join(devnum).join("uevent");
        let uevent = read_attribute(&uevent_path)?;
        let devname = uevent
            .lines()
            .find_map(|line| line.strip_prefix("DEVNAME="))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| GadgetError::Malformed {
                path: uevent_path.clone(),
                reason: "no DEVNAME".to_string(),
            })?;

        debug!("Function hid.{} is {} ({})", function, devname, devnum);
        Ok(self.dev_root.join(devname))
    }

    /// Opens the node for non-blocking writes: a host that stops polling drops reports
    /// instead of stalling the caller
    pub fn open(&self, function: &str, kind: &'static str) -> Result<HidgDevice, GadgetError> {
        let path = self.device_node(function)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| GadgetError::Io {
                path: path.clone(),
                source,
            })?;
        set_nonblocking(&file, &path)?;
        Ok(HidgDevice { kind, path, file })
    }
}

fn set_nonblocking(file: &File, path: &Path) -> Result<(), GadgetError> {
    nix::fcntl::fcntl(file.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).map_err(
        |errno| GadgetError::Io {
            path: path.to_path_buf(),
            source: errno.into(),
        },
    )?;
    Ok(())
}

fn read_attribute(path: &Path) -> Result<String, GadgetError> {
    std::fs::read_to_string(path).map_err(|source| GadgetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// An opened hidg node
#[derive(Debug)]
pub struct HidgDevice {
    kind: &'static str,
    path: PathBuf,
    file: File,
}

impl HidgDevice {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_report(&mut self, bytes: &[u8]) -> Result<(), GadgetError> {
        let written = match self.file.write(bytes) {
            Ok(written) => written,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return Err(GadgetError::Stalled { kind: self.kind })
            }
            Err(source) => {
                return Err(GadgetError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if written != bytes.len() {
            return Err(GadgetError::ShortWrite {
                kind: self.kind,
                written,
                expected: bytes.len(),
            });
        }
        Ok(())
    }
}

pub struct HidgJoystick {
    device: HidgDevice,
    report: JoystickReport,
}

impl HidgJoystick {
    pub fn new(device: HidgDevice) -> Self {
        Self {
            device,
            report: JoystickReport::default(),
        }
    }
}

impl ReportSink for HidgJoystick {
    fn flush(&mut self) -> Result<(), GadgetError> {
        self.device.write_report(&self.report.to_bytes())
    }

    fn reset(&mut self) {
        self.report = JoystickReport::default();
    }
}

impl JoystickSink for HidgJoystick {
    fn set_joystick(&mut self, index: usize, x: f32, y: f32) {
        self.report.set_stick(index, x, y);
    }

    fn set_trigger(&mut self, index: usize, value: f32) {
        self.report.set_trigger(index, value);
    }

    fn set_button(&mut self, index: usize, pressed: bool) {
        self.report.set_button(index, pressed);
    }
}

pub struct HidgMouse {
    device: HidgDevice,
    report: MouseReport,
}

impl HidgMouse {
    pub fn new(device: HidgDevice, counts_per_unit: f32) -> Self {
        Self {
            device,
            report: MouseReport::new(counts_per_unit),
        }
    }
}

impl ReportSink for HidgMouse {
    fn flush(&mut self) -> Result<(), GadgetError> {
        self.device.write_report(&self.report.to_bytes())
    }

    fn reset(&mut self) {
        self.report.reset();
    }
}

impl MouseSink for HidgMouse {
    fn move_by(&mut self, dx: f32, dy: f32) {
        self.report.move_by(dx, dy);
    }

    fn set_button(&mut self, index: usize, pressed: bool) {
        self.report.set_button(index, pressed);
    }
}

pub struct HidgKeyboard {
    device: HidgDevice,
    report: KeyboardReport,
    reader: Option<OutputReportReader>,
}

impl HidgKeyboard {
    pub fn new(device: HidgDevice) -> Self {
        Self {
            device,
            report: KeyboardReport::default(),
            reader: None,
        }
    }
}

impl Drop for HidgKeyboard {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop();
        }
    }
}

/// Thread delivering output reports from its own descriptor of the keyboard node
struct OutputReportReader {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl OutputReportReader {
    fn spawn(path: PathBuf, mut callback: OutputReportCallback) -> Result<Self, GadgetError> {
        let io_error = |source| GadgetError::Io {
            path: path.clone(),
            source,
        };
        let mut file = File::open(&path).map_err(io_error)?;
        set_nonblocking(&file, &path)?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread = std::thread::Builder::new()
            .name("hidg-output-report".to_string())
            .spawn({
                let path = path.clone();
                move || {
                    info!("Listening for output reports on {}", path.display());
                    let mut buffer = [0u8; OUTPUT_REPORT_BUFFER];
                    while !stop_flag.load(Ordering::Relaxed) {
                        match file.read(&mut buffer) {
                            Ok(0) => {
                                debug!("Output report stream on {} closed", path.display());
                                break;
                            }
                            Ok(n) => callback(&buffer[..n]),
                            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                                std::thread::sleep(OUTPUT_REPORT_POLL)
                            }
                            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                            Err(e) => {
                                error!(
                                    "Failed to read output report from {}: {}",
                                    path.display(),
                                    e
                                );
                                break;
                            }
                        }
                    }
                }
            })
            .map_err(io_error)?;

        Ok(Self { stop, thread })
    }

    /// Stops the thread and closes its descriptor
    fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.thread.join().is_err() {
            error!("Output report reader panicked");
        }
    }
}

impl ReportSink for HidgKeyboard {
    fn flush(&mut self) -> Result<(), GadgetError> {
        self.device.write_report(&self.report.to_bytes())
    }

    fn reset(&mut self) {
        self.report = KeyboardReport::default();
    }
}

impl KeyboardSink for HidgKeyboard {
    fn press(&mut self, key: KeyCode) {
        self.report.press(key);
    }

    fn release(&mut self, key: KeyCode) {
        self.report.release(key);
    }

    fn is_pressed(&self, key: KeyCode) -> bool {
        self.report.is_pressed(key)
    }

    /// Reads output reports on a dedicated thread with its own descriptor. The thread is
    /// stopped and joined when the keyboard is dropped.
    fn subscribe_output_report(
        &mut self,
        callback: OutputReportCallback,
    ) -> Result<(), GadgetError> {
        if let Some(previous) = self.reader.take() {
            previous.stop();
        }
        self.reader = Some(OutputReportReader::spawn(
            self.device.path.clone(),
            callback,
        )?);
        Ok(())
    }
}

fn open_function(
    functions: &GadgetFunctions,
    function: &str,
    kind: &'static str,
) -> Option<HidgDevice> {
    if !functions.function_exists(function) {
        warn!("{} gadget not configured (no hid.{})", kind, function);
        return None;
    }
    match functions.open(function, kind) {
        Ok(device) => {
            info!("{} gadget found at {}", kind, device.path().display());
            Some(device)
        }
        Err(e) => {
            error!("{} gadget exists but cannot be opened: {}", kind, e);
            None
        }
    }
}

/// Opens every configured function once; missing or unopenable ones stay absent
pub fn discover(config: &GadgetConfig) -> GadgetBridge {
    let functions = GadgetFunctions::new(config);
    info!("Looking for HID functions in {}", functions.functions_dir.display());

    let joystick: Device<dyn JoystickSink> =
        match open_function(&functions, JOYSTICK_FUNCTION, "Joystick") {
            Some(device) => Device::present("Joystick", Box::new(HidgJoystick::new(device))),
            None => Device::absent("Joystick"),
        };
    let mouse: Device<dyn MouseSink> = match open_function(&functions, MOUSE_FUNCTION, "Mouse") {
        Some(device) => Device::present(
            "Mouse",
            Box::new(HidgMouse::new(device, config.mouse_counts_per_unit)),
        ),
        None => Device::absent("Mouse"),
    };
    let keyboard: Device<dyn KeyboardSink> =
        match open_function(&functions, KEYBOARD_FUNCTION, "Keyboard") {
            Some(device) => Device::present("Keyboard", Box::new(HidgKeyboard::new(device))),
            None => Device::absent("Keyboard"),
        };

    GadgetBridge::new(joystick, mouse, keyboard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::stat::Mode;
    use nix::unistd::mkfifo;
    use std::fs;
    use std::sync::mpsc;
    use std::time::Instant;
    use tempfile::TempDir;

    struct FakeGadget {
        _root: TempDir,
        config: GadgetConfig,
    }

    impl FakeGadget {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let config = GadgetConfig {
                name: "gadget-deck".to_string(),
                configfs_root: root.path().join("configfs"),
                sysfs_char_root: root.path().join("sys/dev/char"),
                dev_root: root.path().join("dev"),
                mouse_counts_per_unit: 1.0,
            };
            fs::create_dir_all(&config.dev_root).unwrap();
            Self {
                _root: root,
                config,
            }
        }

        fn add_function(&self, function: &str, devnum: &str, devname: &str) {
            let dir = self
                .config
                .configfs_root
                .join("gadget-deck/functions")
                .join(format!("hid.{}", function));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("dev"), format!("{}\n", devnum)).unwrap();

            let char_dir = self.config.sysfs_char_root.join(devnum);
            fs::create_dir_all(&char_dir).unwrap();
            fs::write(
                char_dir.join("uevent"),
                format!("MAJOR=240\nMINOR=0\nDEVNAME={}\n", devname),
            )
            .unwrap();
            fs::write(self.config.dev_root.join(devname), b"").unwrap();
        }

        fn functions(&self) -> GadgetFunctions {
            GadgetFunctions::new(&self.config)
        }

        /// Replaces a device node with a FIFO nobody drains, like a host that stopped polling
        fn stall_node(&self, devname: &str) {
            let node = self.config.dev_root.join(devname);
            fs::remove_file(&node).unwrap();
            mkfifo(node.as_path(), Mode::S_IRUSR | Mode::S_IWUSR).unwrap();
        }
    }

    #[test]
    fn resolves_device_node_through_sysfs() {
        let gadget = FakeGadget::new();
        gadget.add_function("keyboard", "240:2", "hidg2");
        let functions = gadget.functions();

        assert!(functions.function_exists("keyboard"));
        assert!(!functions.function_exists("mouse"));
        assert_eq!(
            functions.device_node("keyboard").unwrap(),
            gadget.config.dev_root.join("hidg2")
        );
    }

    #[test]
    fn missing_function_is_reported() {
        let gadget = FakeGadget::new();
        let err = gadget.functions().device_node("joystick").unwrap_err();
        assert!(matches!(err, GadgetError::MissingFunction(name) if name == "joystick"));
    }

    #[test]
    fn malformed_attributes_are_rejected() {
        let gadget = FakeGadget::new();
        gadget.add_function("mouse", "240:1", "hidg1");
        let dev = gadget
            .config
            .configfs_root
            .join("gadget-deck/functions/hid.mouse/dev");
        fs::write(&dev, "garbage\n").unwrap();
        assert!(matches!(
            gadget.functions().device_node("mouse"),
            Err(GadgetError::Malformed { .. })
        ));

        fs::write(&dev, "240:1\n").unwrap();
        let uevent = gadget.config.sysfs_char_root.join("240:1/uevent");
        fs::write(&uevent, "MAJOR=240\nMINOR=1\n").unwrap();
        assert!(matches!(
            gadget.functions().device_node("mouse"),
            Err(GadgetError::Malformed { .. })
        ));
    }

    #[test]
    fn discover_leaves_missing_functions_absent() {
        let gadget = FakeGadget::new();
        gadget.add_function("joystick", "240:0", "hidg0");

        let bridge = discover(&gadget.config);
        assert!(bridge.joystick.is_present());
        assert!(!bridge.mouse.is_present());
        assert!(!bridge.keyboard.is_present());
    }

    #[test]
    fn joystick_flush_writes_one_report() {
        let gadget = FakeGadget::new();
        gadget.add_function("joystick", "240:0", "hidg0");
        let device = gadget.functions().open("joystick", "Joystick").unwrap();
        let mut joystick = HidgJoystick::new(device);

        joystick.set_joystick(0, 1.0, 0.0);
        joystick.set_button(0, true);
        joystick.flush().unwrap();

        let written = fs::read(gadget.config.dev_root.join("hidg0")).unwrap();
        assert_eq!(written, vec![127, 0, 0, 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn output_reports_reach_the_callback() {
        let gadget = FakeGadget::new();
        gadget.add_function("keyboard", "240:2", "hidg2");
        fs::write(gadget.config.dev_root.join("hidg2"), [0b0000_0011]).unwrap();
        let device = gadget.functions().open("keyboard", "Keyboard").unwrap();
        let mut keyboard = HidgKeyboard::new(device);

        let (tx, rx) = mpsc::channel();
        keyboard
            .subscribe_output_report(Box::new(move |bytes| {
                let _ = tx.send(bytes.to_vec());
            }))
            .unwrap();

        let report = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(report, vec![0b0000_0011]);
    }

    #[test]
    fn stalled_host_drops_reports_instead_of_blocking() {
        let gadget = FakeGadget::new();
        gadget.add_function("joystick", "240:0", "hidg0");
        gadget.stall_node("hidg0");
        let device = gadget.functions().open("joystick", "Joystick").unwrap();
        let mut joystick = HidgJoystick::new(device);

        // The pipe buffer holds a few thousand reports, then writes must fail fast
        let stalled = (0..100_000).find_map(|_| joystick.flush().err());
        assert!(matches!(
            stalled,
            Some(GadgetError::Stalled { kind: "Joystick" })
        ));

        let mut device: Device<dyn JoystickSink> = Device::present("Joystick", Box::new(joystick));
        let started = Instant::now();
        for _ in 0..10 {
            device.commit();
        }
        device.neutral();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn dropping_the_keyboard_stops_the_output_report_reader() {
        let gadget = FakeGadget::new();
        gadget.add_function("keyboard", "240:2", "hidg2");
        gadget.stall_node("hidg2");
        let device = gadget.functions().open("keyboard", "Keyboard").unwrap();
        let mut keyboard = HidgKeyboard::new(device);

        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        keyboard
            .subscribe_output_report(Box::new(move |bytes| {
                let _ = tx.send(bytes.to_vec());
            }))
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        drop(keyboard);
        // The callback, and with it the sender, is gone once the thread has been joined
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        );
    }
}
