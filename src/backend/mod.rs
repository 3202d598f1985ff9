//! Pin backends. The libgpiod one drives real character-device lines; the
//! mock one is a pure in-memory simulation used by the tests.

#[cfg(feature = "hardware-gpio")]
pub mod libgpiod;
pub mod mock;

#[cfg(feature = "hardware-gpio")]
pub use libgpiod::LibgpiodBackend;
pub use mock::{MOCK_DEFAULT_PIN_COUNT, MockGpioBackend};
