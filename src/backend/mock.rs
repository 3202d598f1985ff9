use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::thread;
use std::time::Duration;

use crate::error::DebounceError;
use crate::gpio::{EdgeHandler, GpioBackend, Level, Pull};

/// Number of pins exposed by the default mock, matching a typical SoC header.
pub const MOCK_DEFAULT_PIN_COUNT: u32 = 40;

/// In-memory backend. Tests drive it with [`MockGpioBackend::set_level`],
/// which plays the role of the hardware edge interrupt.
pub struct MockGpioBackend {
    pin_count: u32,
    pins: RwLock<HashMap<u32, Mutex<MockPinState>>>, // keyed by pin id
    read_delay: Mutex<Duration>,
}

struct MockPinState {
    pull: Pull,
    level: Level,
    handler: Option<EdgeHandler>,
    interrupt_enabled: bool,
    edges_delivered: usize,
}

impl Default for MockGpioBackend {
    fn default() -> Self {
        Self::new(MOCK_DEFAULT_PIN_COUNT)
    }
}

impl MockGpioBackend {
    pub fn new(pin_count: u32) -> Self {
        Self {
            pin_count,
            pins: RwLock::new(HashMap::new()),
            read_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Drives the pin to `level`. A change on a pin with an enabled interrupt
    /// calls its handler on the current thread. The pin table stays read
    /// locked for the call, so `release` waits for it.
    pub fn set_level(&self, pin: u32, level: Level) -> Result<(), DebounceError> {
        let pins = self
            .pins
            .read()
            .map_err(|e| DebounceError::Gpio(format!("lock poisoned: {e}")))?;
        let entry = pins
            .get(&pin)
            .ok_or_else(|| DebounceError::InvalidArgument(format!("pin {pin} not configured")))?;

        let handler = {
            let mut state = entry
                .lock()
                .map_err(|e| DebounceError::Gpio(format!("lock poisoned: {e}")))?;
            let old = state.level;
            state.level = level;
            if old != level && state.interrupt_enabled {
                state.edges_delivered += 1;
                state.handler.clone()
            } else {
                None
            }
        };

        if let Some(handler) = handler {
            handler();
        }
        Ok(())
    }

    /// Makes every subsequent `read_level` sleep first, widening the window
    /// between a timer firing and the pin being sampled.
    pub fn set_read_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.read_delay.lock() {
            *d = delay;
        }
    }

    pub fn is_configured(&self, pin: u32) -> bool {
        self.pins.read().map(|p| p.contains_key(&pin)).unwrap_or(false)
    }

    pub fn is_interrupt_enabled(&self, pin: u32) -> bool {
        self.with_pin(pin, |p| p.interrupt_enabled).unwrap_or(false)
    }

    pub fn has_handler(&self, pin: u32) -> bool {
        self.with_pin(pin, |p| p.handler.is_some()).unwrap_or(false)
    }

    pub fn pull(&self, pin: u32) -> Option<Pull> {
        self.with_pin(pin, |p| p.pull).ok()
    }

    /// Edges that reached an enabled handler since the pin was configured.
    pub fn edges_delivered(&self, pin: u32) -> usize {
        self.with_pin(pin, |p| p.edges_delivered).unwrap_or(0)
    }

    fn with_pin<T>(
        &self,
        pin: u32,
        f: impl FnOnce(&mut MockPinState) -> T,
    ) -> Result<T, DebounceError> {
        let pins = self
            .pins
            .read()
            .map_err(|e| DebounceError::Gpio(format!("lock poisoned: {e}")))?;
        let entry = pins
            .get(&pin)
            .ok_or_else(|| DebounceError::InvalidArgument(format!("pin {pin} not configured")))?;
        let mut state = entry
            .lock()
            .map_err(|e| DebounceError::Gpio(format!("lock poisoned: {e}")))?;
        Ok(f(&mut state))
    }
}

fn idle_level(pull: Pull) -> Level {
    match pull {
        Pull::PullUp => Level::High,
        Pull::PullDown | Pull::Floating => Level::Low,
    }
}

impl GpioBackend for MockGpioBackend {
    fn is_valid_pin(&self, pin: u32) -> bool {
        pin < self.pin_count
    }

    fn configure_input(&self, pin: u32, pull: Pull) -> Result<(), DebounceError> {
        let mut pins = self
            .pins
            .write()
            .map_err(|e| DebounceError::Gpio(format!("lock poisoned: {e}")))?;

        if pins.contains_key(&pin) {
            return Err(DebounceError::InvalidArgument(format!(
                "pin {pin} is already claimed"
            )));
        }
        pins.insert(
            pin,
            Mutex::new(MockPinState {
                pull,
                level: idle_level(pull),
                handler: None,
                interrupt_enabled: false,
                edges_delivered: 0,
            }),
        );
        Ok(())
    }

    fn read_level(&self, pin: u32) -> Result<Level, DebounceError> {
        let delay = self
            .read_delay
            .lock()
            .map(|d| *d)
            .map_err(|e| DebounceError::Gpio(format!("lock poisoned: {e}")))?;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.with_pin(pin, |p| p.level)
    }

    fn register_interrupt(&self, pin: u32, handler: EdgeHandler) -> Result<(), DebounceError> {
        self.with_pin(pin, |p| p.handler = Some(handler))
    }

    fn enable_interrupt(&self, pin: u32) -> Result<(), DebounceError> {
        self.with_pin(pin, |p| p.interrupt_enabled = true)
    }

    fn disable_interrupt(&self, pin: u32) -> Result<(), DebounceError> {
        self.with_pin(pin, |p| p.interrupt_enabled = false)
    }

    fn release(&self, pin: u32) -> Result<(), DebounceError> {
        let mut pins = self
            .pins
            .write()
            .map_err(|e| DebounceError::Gpio(format!("lock poisoned: {e}")))?;
        pins.remove(&pin);
        Ok(())
    }
}
