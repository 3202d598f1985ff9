pub mod backend;
pub mod config;
pub mod debounce;
pub mod error;
pub mod gpio;
pub mod manager;
pub mod timer;

pub use config::{AppConfig, ContactConfig, DebounceConfig};
pub use debounce::{CallbackSlot, ChannelState, DebounceChannel, StateListener};
pub use error::DebounceError;
pub use gpio::{ActiveLevel, EdgeHandler, GpioBackend, Level, Pull};
pub use manager::{ChannelId, DebounceManager};
pub use timer::{Timer, TimerService, TimerTrigger};

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodBackend;
pub use backend::MockGpioBackend;
