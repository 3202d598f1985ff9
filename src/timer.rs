use log::{debug, error};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use crate::error::DebounceError;

const TIMER_SERVICE_THREAD_NAME: &str = "debounce-timer";

pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

struct TimerEntry {
    period: Duration,
    deadline: Option<Instant>,
    callback: TimerCallback,
    completed: u64,
}

#[derive(Default)]
struct Scheduler {
    timers: FxHashMap<u64, TimerEntry>,
    next_id: u64,
    running: Option<u64>,
    worker: Option<ThreadId>,
    shutdown: bool,
}

impl Scheduler {
    fn on_worker(&self) -> bool {
        self.worker == Some(thread::current().id())
    }

    fn next_due(&self) -> Option<(Instant, u64)> {
        self.timers
            .iter()
            .filter_map(|(id, t)| t.deadline.map(|d| (d, *id)))
            .min()
    }
}

struct Shared {
    scheduler: Mutex<Scheduler>,
    cond: Condvar,
}

impl Shared {
    fn arm(&self, id: u64) {
        let mut scheduler = self.scheduler.lock();
        if let Some(entry) = scheduler.timers.get_mut(&id) {
            entry.deadline = Some(Instant::now() + entry.period);
            self.cond.notify_all();
        }
    }

    /// Returns whether a run that started after this call has completed.
    fn fire_now(&self, id: u64) -> bool {
        let mut scheduler = self.scheduler.lock();

        if scheduler.on_worker() {
            let callback = scheduler.timers.get(&id).map(|t| t.callback.clone());
            drop(scheduler);
            return match callback {
                Some(callback) => {
                    callback();
                    true
                }
                None => false,
            };
        }
        if scheduler.shutdown {
            return false;
        }

        let in_flight = u64::from(scheduler.running == Some(id));
        let Some(entry) = scheduler.timers.get_mut(&id) else {
            return false;
        };
        let target = entry.completed + in_flight + 1;
        entry.deadline = Some(Instant::now());
        self.cond.notify_all();

        loop {
            let completed = match scheduler.timers.get(&id) {
                Some(t) => t.completed,
                None => return false,
            };
            if completed >= target {
                return true;
            }
            if scheduler.shutdown {
                return false;
            }
            self.cond.wait(&mut scheduler);
        }
    }

    fn disarm(&self, id: u64) {
        let mut scheduler = self.scheduler.lock();
        if let Some(entry) = scheduler.timers.get_mut(&id) {
            entry.deadline = None;
        }
    }
}

/// Single worker thread that runs every timer expiry, one at a time, in
/// deadline order.
pub struct TimerService {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl TimerService {
    pub fn new() -> Result<Self, DebounceError> {
        let shared = Arc::new(Shared {
            scheduler: Mutex::new(Scheduler::default()),
            cond: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(TIMER_SERVICE_THREAD_NAME.into())
            .spawn(move || run_worker(worker_shared))
            .map_err(|e| DebounceError::ResourceExhausted(format!("spawn timer worker: {e}")))?;

        shared.scheduler.lock().worker = Some(worker.thread().id());

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Creates a dormant single-shot timer. Nothing runs until one of its
    /// triggers resets or fires it.
    pub fn create_timer(
        &self,
        period: Duration,
        callback: TimerCallback,
    ) -> Result<Timer, DebounceError> {
        let mut scheduler = self.shared.scheduler.lock();
        if scheduler.shutdown {
            return Err(DebounceError::ResourceExhausted(
                "timer service is shut down".into(),
            ));
        }

        let id = scheduler.next_id;
        scheduler.next_id += 1;
        scheduler.timers.insert(
            id,
            TimerEntry {
                period,
                deadline: None,
                callback,
                completed: 0,
            },
        );

        Ok(Timer {
            id,
            shared: self.shared.clone(),
        })
    }

    pub fn active_timers(&self) -> usize {
        self.shared.scheduler.lock().timers.len()
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        {
            let mut scheduler = self.shared.scheduler.lock();
            scheduler.shutdown = true;
            self.shared.cond.notify_all();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(shared: Arc<Shared>) {
    let mut scheduler = shared.scheduler.lock();
    loop {
        if scheduler.shutdown {
            break;
        }

        let Some((deadline, id)) = scheduler.next_due() else {
            shared.cond.wait(&mut scheduler);
            continue;
        };
        if deadline > Instant::now() {
            shared.cond.wait_until(&mut scheduler, deadline);
            continue;
        }

        let Some(entry) = scheduler.timers.get_mut(&id) else {
            continue;
        };
        entry.deadline = None;
        let callback = entry.callback.clone();
        scheduler.running = Some(id);

        let outcome =
            MutexGuard::unlocked(&mut scheduler, || catch_unwind(AssertUnwindSafe(|| callback())));
        if outcome.is_err() {
            error!("timer {id} callback panicked");
        }

        scheduler.running = None;
        if let Some(entry) = scheduler.timers.get_mut(&id) {
            entry.completed += 1;
        }
        shared.cond.notify_all();
    }
    debug!("timer worker stopped");
}

/// A single-shot, retriggerable timer. Dropping it destroys the timer and
/// waits for an expiry that is already running.
pub struct Timer {
    id: u64,
    shared: Arc<Shared>,
}

impl Timer {
    pub fn stop(&self) {
        self.shared.disarm(self.id);
    }

    /// A weak handle usable from the edge context. It never keeps the timer
    /// or the service alive.
    pub fn trigger(&self) -> TimerTrigger {
        TimerTrigger {
            id: self.id,
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let mut scheduler = self.shared.scheduler.lock();
        scheduler.timers.remove(&self.id);
        if !scheduler.on_worker() {
            while scheduler.running == Some(self.id) {
                self.shared.cond.wait(&mut scheduler);
            }
        }
        self.shared.cond.notify_all();
    }
}

#[derive(Clone)]
pub struct TimerTrigger {
    id: u64,
    shared: Weak<Shared>,
}

impl TimerTrigger {
    /// Restarts the timer. Does nothing once the timer has been destroyed.
    pub fn reset(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.arm(self.id);
        }
    }

    /// Runs the callback on the worker as soon as possible and blocks until
    /// that run has finished. Called on the worker itself, runs inline.
    /// Returns false when the run never happened because the timer was
    /// destroyed or the service shut down.
    pub fn fire_now(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.fire_now(self.id))
    }
}
