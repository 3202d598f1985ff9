use std::sync::Arc;

use serde::Deserialize;

use crate::error::DebounceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn toggled(&self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// Physical level that means "triggered" for a channel.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveLevel {
    Low,
    #[default]
    High,
}

impl ActiveLevel {
    pub fn level(&self) -> Level {
        match self {
            ActiveLevel::Low => Level::Low,
            ActiveLevel::High => Level::High,
        }
    }

    pub fn is_active(&self, level: Level) -> bool {
        self.level() == level
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Pull {
    Floating,
    #[default]
    PullUp,
    PullDown,
}

/// Called by a backend for every transition seen on a pin whose interrupt is
/// enabled. Runs in the backend's edge context: it must not block or allocate.
pub type EdgeHandler = Arc<dyn Fn() + Send + Sync>;

pub trait GpioBackend: Send + Sync {
    fn is_valid_pin(&self, pin: u32) -> bool;
    /// Claims the pin as an input with any-edge detection. The interrupt
    /// starts disabled. Fails with `InvalidArgument` if the pin is already
    /// claimed, leaving the existing claim untouched.
    fn configure_input(&self, pin: u32, pull: Pull) -> Result<(), DebounceError>;
    fn read_level(&self, pin: u32) -> Result<Level, DebounceError>;
    fn register_interrupt(&self, pin: u32, handler: EdgeHandler) -> Result<(), DebounceError>;
    fn enable_interrupt(&self, pin: u32) -> Result<(), DebounceError>;
    fn disable_interrupt(&self, pin: u32) -> Result<(), DebounceError>;
    /// Drops the interrupt handler and gives the pin back. Returns once the
    /// handler can no longer be called, waiting out a call already running.
    fn release(&self, pin: u32) -> Result<(), DebounceError>;
}
