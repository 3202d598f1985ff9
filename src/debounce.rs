//! Per-pin debounce channel.
//!
//! Edges reach a channel through its interrupt front-end, which does nothing
//! but restart the channel's settle timer. Once the line has been quiet for
//! the whole quiet interval the timer worker samples the pin, updates the
//! channel state and dispatches the matching callback. All evaluations of all
//! channels share that one worker, so a slow callback delays every channel.

use log::{debug, error, warn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::error::DebounceError;
use crate::gpio::{ActiveLevel, EdgeHandler, GpioBackend, Pull};
use crate::timer::{Timer, TimerService, TimerTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelState {
    Uninitialized = 0,
    Idle = 1,
    Triggered = 2,
}

impl ChannelState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ChannelState::Idle,
            2 => ChannelState::Triggered,
            _ => ChannelState::Uninitialized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackSlot {
    /// Fired on the transition into `Triggered`.
    Trigger,
    /// Fired on the transition into `Idle`.
    Clear,
}

impl CallbackSlot {
    pub fn target_state(&self) -> ChannelState {
        match self {
            CallbackSlot::Trigger => ChannelState::Triggered,
            CallbackSlot::Clear => ChannelState::Idle,
        }
    }
}

pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Receives every confirmed transition of a channel.
pub trait StateListener: Send + Sync {
    fn on_state_change(&self, state: ChannelState);
}

struct ChannelInner<B: GpioBackend> {
    pin: u32,
    active_level: ActiveLevel,
    backend: Arc<B>,
    state: AtomicU8,
    armed: AtomicBool,
    on_trigger: RwLock<Option<Callback>>,
    on_clear: RwLock<Option<Callback>>,
}

impl<B: GpioBackend> ChannelInner<B> {
    fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn slot(&self, slot: CallbackSlot) -> &RwLock<Option<Callback>> {
        match slot {
            CallbackSlot::Trigger => &self.on_trigger,
            CallbackSlot::Clear => &self.on_clear,
        }
    }

    /// Timer expiry: runs on the shared worker only.
    fn settle(&self) {
        if !self.armed.load(Ordering::Acquire) {
            return;
        }

        let level = match self.backend.read_level(self.pin) {
            Ok(level) => level,
            Err(e) => {
                warn!("pin {}: read level failed, skipping evaluation: {e}", self.pin);
                return;
            }
        };

        let triggered = self.active_level.is_active(level);
        let current = self.state();
        let next = if triggered && current != ChannelState::Triggered {
            CallbackSlot::Trigger
        } else if !triggered && current != ChannelState::Idle {
            CallbackSlot::Clear
        } else {
            return;
        };

        let state = next.target_state();
        self.state.store(state as u8, Ordering::Release);
        debug!("pin {}: {:?} -> {:?}", self.pin, current, state);
        self.dispatch(next);
    }

    fn dispatch(&self, slot: CallbackSlot) {
        // read the slot as late as possible so a removal is honoured
        let callback = self.slot(slot).read().clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!("pin {}: {:?} callback panicked", self.pin, slot);
            }
        }
    }
}

/// One monitored input. Dropping the channel tears it down the same way
/// [`DebounceChannel::delete`] does.
pub struct DebounceChannel<B: GpioBackend> {
    inner: Arc<ChannelInner<B>>,
    settle: TimerTrigger,
    timer: Mutex<Option<Timer>>,
}

impl<B: GpioBackend + 'static> DebounceChannel<B> {
    /// Claims `pin` as an input and prepares a dormant settle timer. The edge
    /// interrupt stays disabled until [`init`](Self::init).
    pub fn create(
        backend: Arc<B>,
        timers: &TimerService,
        quiet_interval: Duration,
        pin: u32,
        active_level: ActiveLevel,
        pull: Pull,
    ) -> Result<Self, DebounceError> {
        if !backend.is_valid_pin(pin) {
            return Err(DebounceError::InvalidArgument(format!(
                "pin {pin} is out of range"
            )));
        }

        let inner = Arc::new(ChannelInner {
            pin,
            active_level,
            backend: backend.clone(),
            state: AtomicU8::new(ChannelState::Uninitialized as u8),
            armed: AtomicBool::new(false),
            on_trigger: RwLock::new(None),
            on_clear: RwLock::new(None),
        });

        let settle_inner = inner.clone();
        let timer = timers.create_timer(quiet_interval, Arc::new(move || settle_inner.settle()))?;

        let settle = timer.trigger();
        let trigger = timer.trigger();
        let front_end: EdgeHandler = Arc::new(move || trigger.reset());

        // a pin claimed by another channel is left untouched
        backend.configure_input(pin, pull)?;
        let configured = backend
            .disable_interrupt(pin)
            .and_then(|_| backend.register_interrupt(pin, front_end));
        if let Err(e) = configured {
            let _ = backend.release(pin);
            return Err(e);
        }

        debug!("pin {pin}: channel created ({active_level:?}, {pull:?})");
        Ok(Self {
            inner,
            settle,
            timer: Mutex::new(Some(timer)),
        })
    }

    /// Enables the edge interrupt and runs one forced evaluation, so exactly
    /// one of the two callbacks reports the level at boot. Later calls are
    /// no-ops.
    pub fn init(&self) -> Result<(), DebounceError> {
        if self.is_deleted() {
            return Err(DebounceError::InvalidArgument(format!(
                "pin {}: channel was deleted",
                self.inner.pin
            )));
        }
        if self
            .inner
            .armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        if let Err(e) = self.inner.backend.enable_interrupt(self.inner.pin) {
            self.inner.armed.store(false, Ordering::Release);
            return Err(e);
        }

        if !self.settle.fire_now() {
            let _ = self.inner.backend.disable_interrupt(self.inner.pin);
            self.inner.armed.store(false, Ordering::Release);
            return Err(DebounceError::ResourceExhausted(format!(
                "pin {}: timer service is shut down",
                self.inner.pin
            )));
        }
        debug!("pin {}: initialized as {:?}", self.inner.pin, self.inner.state());
        Ok(())
    }

    pub fn set_callback<C, F>(&self, slot: CallbackSlot, ctx: C, f: F)
    where
        C: Send + Sync + 'static,
        F: Fn(&C) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(move || f(&ctx));
        *self.inner.slot(slot).write() = Some(callback);
    }

    pub fn set_press_callback<C, F>(&self, ctx: C, f: F)
    where
        C: Send + Sync + 'static,
        F: Fn(&C) + Send + Sync + 'static,
    {
        self.set_callback(CallbackSlot::Trigger, ctx, f);
    }

    pub fn set_release_callback<C, F>(&self, ctx: C, f: F)
    where
        C: Send + Sync + 'static,
        F: Fn(&C) + Send + Sync + 'static,
    {
        self.set_callback(CallbackSlot::Clear, ctx, f);
    }

    /// Points both slots at `listener`.
    pub fn set_listener(&self, listener: Arc<dyn StateListener>) {
        for slot in [CallbackSlot::Trigger, CallbackSlot::Clear] {
            let state = slot.target_state();
            self.set_callback(slot, listener.clone(), move |l| l.on_state_change(state));
        }
    }

    pub fn remove_callback(&self, slot: CallbackSlot) {
        *self.inner.slot(slot).write() = None;
    }

    pub fn is_deleted(&self) -> bool {
        self.timer.lock().is_none()
    }

    pub fn has_callback(&self, slot: CallbackSlot) -> bool {
        self.inner.slot(slot).read().is_some()
    }

    pub fn state(&self) -> ChannelState {
        self.inner.state()
    }

    pub fn pin(&self) -> u32 {
        self.inner.pin
    }
}

impl<B: GpioBackend> DebounceChannel<B> {
    /// Disables the interrupt, destroys the settle timer (waiting for an
    /// evaluation that is already running) and gives the pin back. Only the
    /// first call does anything.
    pub fn delete(&self) -> Result<(), DebounceError> {
        let Some(timer) = self.timer.lock().take() else {
            return Ok(());
        };
        let pin = self.inner.pin;

        let disabled = self.inner.backend.disable_interrupt(pin);
        timer.stop();
        drop(timer);
        self.inner.armed.store(false, Ordering::Release);
        let released = self.inner.backend.release(pin);

        debug!("pin {pin}: channel deleted");
        disabled.and(released)
    }
}

impl<B: GpioBackend> Drop for DebounceChannel<B> {
    fn drop(&mut self) {
        if let Err(e) = self.delete() {
            warn!("pin {}: teardown failed: {e}", self.inner.pin);
        }
    }
}
