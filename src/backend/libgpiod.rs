use log::warn;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, yield_now};
use std::time::Duration;

use libgpiod::{chip::Chip, line, request};
use parking_lot::{FairMutex, RwLock};
use rustc_hash::FxHashMap;

use crate::config::ContactConfig;
use crate::error::DebounceError;
use crate::gpio::{EdgeHandler, GpioBackend, Level, Pull};

const LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY: usize = 64;
const LIBGPIOD_BACKEND_EVENT_WAIT_TIMEOUT_MS: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
struct LineAddress {
    chip: String,
    line: u32,
}

/// Linux character-device backend. Pin ids are resolved to `(chip, line)`
/// through the configured contact table; only those pins are legal.
pub struct LibgpiodBackend {
    lines: FxHashMap<u32, LineAddress>,
    pins: RwLock<FxHashMap<u32, PinHandle>>, // keyed by pin id
}

struct PinHandle {
    listener: Option<EdgeListener>, // must stop before the request is released
    line: u32,
    enabled: Arc<AtomicBool>,
    gpiod_handle: Arc<FairMutex<GpiodHandle>>,
}

struct GpiodHandle {
    request: request::Request,
}

impl GpiodHandle {
    fn new(chip: &str, line_cfg: &line::Config) -> Result<Self, DebounceError> {
        let chip = Self::open_chip(chip)?;
        let request = Self::request_lines(&chip, line_cfg)?;
        Ok(Self { request })
    }

    fn open_chip(path: &str) -> Result<Chip, DebounceError> {
        let p = PathBuf::from(path);
        Chip::open(&p).map_err(|e| DebounceError::Gpio(format!("open chip {path}: {e}")))
    }

    fn request_lines(
        chip: &Chip,
        line_cfg: &line::Config,
    ) -> Result<request::Request, DebounceError> {
        let mut req_cfg = request::Config::new()
            .map_err(|e| DebounceError::Gpio(format!("request config: {e}")))?;
        req_cfg
            .set_consumer(env!("CARGO_PKG_NAME"))
            .map_err(|e| DebounceError::Gpio(format!("request consumer: {e}")))?;
        chip.request_lines(Some(&req_cfg), line_cfg)
            .map_err(|e| DebounceError::ResourceExhausted(format!("request lines: {e}")))
    }
}

/// Thread standing in for the edge interrupt: it drains kernel edge events
/// and calls the handler once per event while the pin is enabled.
struct EdgeListener {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EdgeListener {
    fn new(
        pin: u32,
        gpiod_handle: Arc<FairMutex<GpiodHandle>>,
        enabled: Arc<AtomicBool>,
        handler: EdgeHandler,
    ) -> Result<Self, DebounceError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();
        let mut buffer = request::Buffer::new(LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY)
            .map_err(|e| DebounceError::ResourceExhausted(format!("event buffer: {e}")))?;

        let handle = std::thread::Builder::new()
            .name(format!("edge-listener-{pin}"))
            .spawn(move || {
                while !cancel_flag.load(Ordering::Relaxed) {
                    let hdl = gpiod_handle.lock();
                    let req = &hdl.request;

                    let has_event =
                        match req.wait_edge_events(Some(LIBGPIOD_BACKEND_EVENT_WAIT_TIMEOUT_MS)) {
                            Ok(v) => v,
                            Err(e) => {
                                warn!("wait edge events error for pin {pin}: {e}");
                                drop(hdl);
                                yield_now();
                                continue;
                            }
                        };
                    if !has_event {
                        continue;
                    }

                    let events = match req.read_edge_events(&mut buffer) {
                        Ok(evts) => evts,
                        Err(e) => {
                            warn!("read edge events error for pin {pin}: {e}");
                            drop(hdl);
                            yield_now();
                            continue;
                        }
                    };

                    // events read while disabled are discarded
                    let edges = events.filter(|evt| evt.is_ok()).count();
                    drop(hdl);
                    if edges > 0 && enabled.load(Ordering::Acquire) {
                        handler();
                    }
                }
            })
            .map_err(|e| DebounceError::ResourceExhausted(format!("spawn edge listener: {e}")))?;

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }
}

impl Drop for EdgeListener {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl LibgpiodBackend {
    pub fn new(contacts: &FxHashMap<u32, ContactConfig>) -> Result<Self, DebounceError> {
        let lines = contacts
            .iter()
            .map(|(pin, cfg)| {
                (
                    *pin,
                    LineAddress {
                        chip: cfg.chip.clone(),
                        line: cfg.line,
                    },
                )
            })
            .collect();

        Ok(Self {
            lines,
            pins: RwLock::new(FxHashMap::default()),
        })
    }

    fn make_line_settings(pull: Pull) -> Result<line::Settings, DebounceError> {
        let mut ls = line::Settings::new()
            .map_err(|e| DebounceError::Gpio(format!("libgpiod settings: {e}")))?;

        ls.set_direction(line::Direction::Input)
            .map_err(|e| DebounceError::Gpio(format!("set direction: {e}")))?;
        let bias = match pull {
            Pull::Floating => None,
            Pull::PullUp => Some(line::Bias::PullUp),
            Pull::PullDown => Some(line::Bias::PullDown),
        };
        ls.set_bias(bias)
            .map_err(|e| DebounceError::Gpio(format!("set bias: {e}")))?;
        ls.set_edge_detection(Some(line::Edge::Both))
            .map_err(|e| DebounceError::Gpio(format!("set edge detection: {e}")))?;

        Ok(ls)
    }

    fn make_line_config(offset: u32, settings: line::Settings) -> Result<line::Config, DebounceError> {
        let mut cfg =
            line::Config::new().map_err(|e| DebounceError::Gpio(format!("line config: {e}")))?;
        cfg.add_line_settings(&[offset], settings)
            .map_err(|e| DebounceError::Gpio(format!("line config add settings: {e}")))?;
        Ok(cfg)
    }

    fn with_handle<T>(
        &self,
        pin: u32,
        f: impl FnOnce(&mut PinHandle) -> Result<T, DebounceError>,
    ) -> Result<T, DebounceError> {
        let mut pins = self.pins.write();
        let handle = pins.get_mut(&pin).ok_or_else(|| {
            DebounceError::InvalidArgument(format!("pin {pin} not configured as input"))
        })?;
        f(handle)
    }
}

impl GpioBackend for LibgpiodBackend {
    fn is_valid_pin(&self, pin: u32) -> bool {
        self.lines.contains_key(&pin)
    }

    fn configure_input(&self, pin: u32, pull: Pull) -> Result<(), DebounceError> {
        let address = self
            .lines
            .get(&pin)
            .ok_or_else(|| DebounceError::InvalidArgument(format!("unknown pin {pin}")))?;

        let line_settings = Self::make_line_settings(pull)?;
        let line_cfg = Self::make_line_config(address.line, line_settings)?;

        let mut pins = self.pins.write();
        if pins.contains_key(&pin) {
            return Err(DebounceError::InvalidArgument(format!(
                "pin {pin} is already claimed"
            )));
        }

        let gpiod_handle = Arc::new(FairMutex::new(GpiodHandle::new(&address.chip, &line_cfg)?));
        pins.insert(
            pin,
            PinHandle {
                listener: None,
                line: address.line,
                enabled: Arc::new(AtomicBool::new(false)),
                gpiod_handle,
            },
        );

        Ok(())
    }

    fn read_level(&self, pin: u32) -> Result<Level, DebounceError> {
        let (line, gpiod_handle) = {
            let pins = self.pins.read();
            let handle = pins.get(&pin).ok_or_else(|| {
                DebounceError::InvalidArgument(format!("pin {pin} not configured as input"))
            })?;
            (handle.line, handle.gpiod_handle.clone())
        };

        let value = gpiod_handle
            .lock()
            .request
            .value(line)
            .map_err(|e| DebounceError::Gpio(format!("get value: {e}")))?;
        Ok(match value {
            line::Value::InActive => Level::Low,
            line::Value::Active => Level::High,
        })
    }

    fn register_interrupt(&self, pin: u32, handler: EdgeHandler) -> Result<(), DebounceError> {
        self.with_handle(pin, |handle| {
            // replacing a handler stops the old listener first
            handle.listener.take();
            handle.listener = Some(EdgeListener::new(
                pin,
                handle.gpiod_handle.clone(),
                handle.enabled.clone(),
                handler,
            )?);
            Ok(())
        })
    }

    fn enable_interrupt(&self, pin: u32) -> Result<(), DebounceError> {
        self.with_handle(pin, |handle| {
            handle.enabled.store(true, Ordering::Release);
            Ok(())
        })
    }

    fn disable_interrupt(&self, pin: u32) -> Result<(), DebounceError> {
        self.with_handle(pin, |handle| {
            handle.enabled.store(false, Ordering::Release);
            Ok(())
        })
    }

    fn release(&self, pin: u32) -> Result<(), DebounceError> {
        let handle = self.pins.write().remove(&pin);
        if let Some(mut handle) = handle {
            handle.enabled.store(false, Ordering::Release);
            drop(handle.listener.take());
        }
        Ok(())
    }
}
