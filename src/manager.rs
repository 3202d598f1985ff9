use log::debug;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::config::DebounceConfig;
use crate::debounce::{CallbackSlot, ChannelState, DebounceChannel, StateListener};
use crate::error::DebounceError;
use crate::gpio::{ActiveLevel, GpioBackend, Pull};
use crate::timer::TimerService;

/// Handle to a channel owned by a [`DebounceManager`]. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

/// Application-owned registry of debounce channels sharing one backend and
/// one timer worker.
pub struct DebounceManager<B: GpioBackend> {
    channels: RwLock<FxHashMap<ChannelId, Arc<DebounceChannel<B>>>>, // dropped before the timer worker
    timers: TimerService,
    backend: Arc<B>,
    config: DebounceConfig,
    next_id: AtomicU64,
}

impl<B: GpioBackend + 'static> DebounceManager<B> {
    pub fn new(backend: Arc<B>, config: DebounceConfig) -> Result<Self, DebounceError> {
        Ok(Self {
            channels: RwLock::new(FxHashMap::default()),
            timers: TimerService::new()?,
            backend,
            config,
            next_id: AtomicU64::new(0),
        })
    }

    pub fn create(&self, pin: u32, active_level: ActiveLevel) -> Result<ChannelId, DebounceError> {
        self.create_with_pull(pin, active_level, Pull::default())
    }

    pub fn create_with_pull(
        &self,
        pin: u32,
        active_level: ActiveLevel,
        pull: Pull,
    ) -> Result<ChannelId, DebounceError> {
        let mut channels = self.channels.write();
        if channels.values().any(|c| c.pin() == pin) {
            return Err(DebounceError::InvalidArgument(format!(
                "pin {pin} is already monitored"
            )));
        }

        let channel = DebounceChannel::create(
            self.backend.clone(),
            &self.timers,
            self.config.quiet_interval(),
            pin,
            active_level,
            pull,
        )?;

        let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed));
        channels.insert(id, Arc::new(channel));
        debug!("{id} created for pin {pin}");
        Ok(id)
    }

    /// Starts monitoring. Blocks until the boot-time callback has run.
    pub fn init(&self, id: ChannelId) -> Result<(), DebounceError> {
        self.channel(id)?.init()
    }

    pub fn set_callback<C, F>(
        &self,
        id: ChannelId,
        slot: CallbackSlot,
        ctx: C,
        f: F,
    ) -> Result<(), DebounceError>
    where
        C: Send + Sync + 'static,
        F: Fn(&C) + Send + Sync + 'static,
    {
        self.channel(id)?.set_callback(slot, ctx, f);
        Ok(())
    }

    pub fn set_press_callback<C, F>(&self, id: ChannelId, ctx: C, f: F) -> Result<(), DebounceError>
    where
        C: Send + Sync + 'static,
        F: Fn(&C) + Send + Sync + 'static,
    {
        self.set_callback(id, CallbackSlot::Trigger, ctx, f)
    }

    pub fn set_release_callback<C, F>(
        &self,
        id: ChannelId,
        ctx: C,
        f: F,
    ) -> Result<(), DebounceError>
    where
        C: Send + Sync + 'static,
        F: Fn(&C) + Send + Sync + 'static,
    {
        self.set_callback(id, CallbackSlot::Clear, ctx, f)
    }

    pub fn set_listener(
        &self,
        id: ChannelId,
        listener: Arc<dyn StateListener>,
    ) -> Result<(), DebounceError> {
        self.channel(id)?.set_listener(listener);
        Ok(())
    }

    pub fn remove_callback(&self, id: ChannelId, slot: CallbackSlot) -> Result<(), DebounceError> {
        self.channel(id)?.remove_callback(slot);
        Ok(())
    }

    /// Tears the channel down, waiting for an in-flight evaluation of it.
    pub fn delete(&self, id: ChannelId) -> Result<(), DebounceError> {
        // removed under the lock, torn down outside it
        let channel = self
            .channels
            .write()
            .remove(&id)
            .ok_or_else(|| DebounceError::InvalidArgument(format!("unknown {id}")))?;
        channel.delete()?;
        debug!("{id} deleted");
        Ok(())
    }

    pub fn state(&self, id: ChannelId) -> Result<ChannelState, DebounceError> {
        Ok(self.channel(id)?.state())
    }

    pub fn pin(&self, id: ChannelId) -> Result<u32, DebounceError> {
        Ok(self.channel(id)?.pin())
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.channels.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn active_timers(&self) -> usize {
        self.timers.active_timers()
    }

    /// Clones the channel out so no registry lock is held while callbacks
    /// run on the worker.
    fn channel(&self, id: ChannelId) -> Result<Arc<DebounceChannel<B>>, DebounceError> {
        self.channels
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| DebounceError::InvalidArgument(format!("unknown {id}")))
    }
}
