//! Virtual clock and timer dispatch.
//!
//! The firmware never reads a wall clock. Time only advances when a physics
//! step completes and calls [`Scheduler::stop_clock`] with the model's new
//! timestamp. Timer procedures registered by firmware components run after
//! each step, and are held off while an [`AtomicSection`] is active.

use parking_lot::Mutex;
use sitl_common::SimTime;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use tracing::trace;

/// A procedure run on every timer tick.
pub type TimerProc = Box<dyn FnMut() + Send>;

/// Virtual clock and timer registry shared by every firmware thread.
pub struct Scheduler {
    now_us: AtomicU64,
    main_thread: ThreadId,
    background_thread: Mutex<Option<ThreadId>>,
    semaphore_wait_hack: AtomicBool,
    armed: AtomicBool,
    atomic_depth: AtomicUsize,
    in_timer_event: AtomicBool,
    timer_procs: Mutex<Vec<TimerProc>>,
}

impl Scheduler {
    /// Create a scheduler whose main thread is the calling thread.
    ///
    /// The clock starts at 1 µs so that a zero timestamp never means
    /// "now" to the firmware.
    pub fn new() -> Self {
        Scheduler {
            now_us: AtomicU64::new(1),
            main_thread: thread::current().id(),
            background_thread: Mutex::new(None),
            semaphore_wait_hack: AtomicBool::new(false),
            armed: AtomicBool::new(false),
            atomic_depth: AtomicUsize::new(0),
            in_timer_event: AtomicBool::new(false),
            timer_procs: Mutex::new(Vec::new()),
        }
    }

    // ========================================================================
    // Clock
    // ========================================================================

    /// Current virtual time in microseconds.
    pub fn micros64(&self) -> u64 {
        self.now_us.load(Ordering::Acquire)
    }

    /// Current virtual time.
    pub fn now(&self) -> SimTime {
        SimTime::from_micros(self.micros64())
    }

    /// Advance the clock to `time_us`. Earlier values are ignored.
    pub fn stop_clock(&self, time_us: u64) {
        let previous = self.now_us.fetch_max(time_us, Ordering::AcqRel);
        if time_us < previous {
            trace!(time_us, previous, "ignoring clock rewind");
        }
    }

    // ========================================================================
    // Thread Identity
    // ========================================================================

    /// Whether the caller is the thread that drives the clock.
    pub fn in_main_thread(&self) -> bool {
        thread::current().id() == self.main_thread
    }

    /// Designate the calling thread as the background task that may yield
    /// instead of sleeping while waiting on the clock.
    pub fn register_background_thread(&self) {
        *self.background_thread.lock() = Some(thread::current().id());
    }

    /// Whether the caller is the registered background task.
    pub fn in_background_thread(&self) -> bool {
        *self.background_thread.lock() == Some(thread::current().id())
    }

    /// Legacy mode in which any waiting thread steps the physics.
    pub fn semaphore_wait_hack(&self) -> bool {
        self.semaphore_wait_hack.load(Ordering::Relaxed)
    }

    /// Enable or disable the legacy stepping mode.
    pub fn set_semaphore_wait_hack(&self, enabled: bool) {
        self.semaphore_wait_hack.store(enabled, Ordering::Relaxed);
    }

    /// Whether the vehicle is armed.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    /// Record the vehicle's arming state.
    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::Relaxed);
    }

    // ========================================================================
    // Atomic Sections
    // ========================================================================

    /// Suspend timer procedures until the returned guard is dropped.
    ///
    /// Sections nest; timers resume when the outermost guard drops.
    pub fn begin_atomic(&self) -> AtomicSection<'_> {
        self.atomic_depth.fetch_add(1, Ordering::AcqRel);
        AtomicSection { scheduler: self }
    }

    /// Whether any atomic section is active.
    pub fn interrupts_blocked(&self) -> bool {
        self.atomic_depth.load(Ordering::Acquire) > 0
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Register a procedure to run on every timer tick.
    pub fn register_timer_process(&self, proc: TimerProc) {
        self.timer_procs.lock().push(proc);
    }

    /// Run the registered timer procedures.
    ///
    /// Does nothing while an atomic section is active or when called from
    /// inside a timer procedure. The registry is unlocked while procedures
    /// run, so they may register further procedures; those first run on
    /// the next tick.
    pub fn timer_event(&self) {
        if self.interrupts_blocked() {
            return;
        }
        if self.in_timer_event.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut dispatch = TimerDispatch {
            scheduler: self,
            running: std::mem::take(&mut *self.timer_procs.lock()),
        };
        for proc in dispatch.running.iter_mut() {
            proc();
        }
    }
}

/// Procedures taken out of the registry for one tick.
///
/// Dropping it, including while unwinding from a panicking procedure,
/// puts them back ahead of any registered meanwhile and ends the tick.
struct TimerDispatch<'a> {
    scheduler: &'a Scheduler,
    running: Vec<TimerProc>,
}

impl Drop for TimerDispatch<'_> {
    fn drop(&mut self) {
        let mut procs = self.scheduler.timer_procs.lock();
        let added = std::mem::replace(&mut *procs, std::mem::take(&mut self.running));
        procs.extend(added);
        drop(procs);
        self.scheduler.in_timer_event.store(false, Ordering::Release);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("now_us", &self.micros64())
            .field("main_thread", &self.main_thread)
            .field("atomic_depth", &self.atomic_depth.load(Ordering::Relaxed))
            .field("timer_procs", &self.timer_procs.lock().len())
            .finish()
    }
}

/// Guard for an atomic section. Timers stay suspended while it lives.
#[must_use = "the atomic section ends when the guard is dropped"]
pub struct AtomicSection<'a> {
    scheduler: &'a Scheduler,
}

impl Drop for AtomicSection<'_> {
    fn drop(&mut self) {
        self.scheduler.atomic_depth.fetch_sub(1, Ordering::AcqRel);
    }
}
