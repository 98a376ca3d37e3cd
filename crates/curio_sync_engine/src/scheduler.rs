//! Push scheduling state machine.
//!
//! The scheduler is pure bookkeeping; the engine actor owns it and arms
//! the actual timers. Each armed debounce timer carries the generation it
//! was armed for, so a timer that outlived its cycle is recognised and
//! ignored when it fires.

/// Push cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    /// No push is pending.
    #[default]
    Idle,
    /// A debounce timer is armed.
    Scheduled,
    /// A push is running its remote I/O.
    Pushing,
}

impl SchedulerState {
    /// Returns true if a push is armed or running.
    pub fn is_active(&self) -> bool {
        matches!(self, SchedulerState::Scheduled | SchedulerState::Pushing)
    }
}

/// Coalescing push scheduler plus the single "syncing" guard.
///
/// A write while `Idle` arms one timer; further writes while `Scheduled`
/// or `Pushing` only mark the state dirty. The timer is never re-armed by
/// a write, so a sustained stream of writes still flushes once per
/// debounce window.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    state: SchedulerState,
    generation: u64,
    syncing: bool,
    dirty: bool,
}

impl Scheduler {
    /// Creates an idle scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a local write.
    ///
    /// Returns the generation of a newly armed timer, or `None` if a push
    /// is already scheduled or running.
    pub fn note_write(&mut self) -> Option<u64> {
        self.dirty = true;
        self.arm()
    }

    /// Handles an expired debounce timer.
    ///
    /// Returns true if the caller should start a push now. A stale timer is
    /// ignored. A timer that fires while another sync is running is dropped;
    /// the pending write is re-armed when that sync finishes.
    pub fn debounce_elapsed(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != SchedulerState::Scheduled {
            return false;
        }
        if self.syncing {
            self.state = SchedulerState::Idle;
            return false;
        }
        self.start_push();
        true
    }

    /// Starts a push that bypasses the debounce, cancelling any armed timer.
    ///
    /// Returns false if another sync is running.
    pub fn begin_forced_push(&mut self) -> bool {
        if self.syncing {
            return false;
        }
        self.generation += 1;
        self.start_push();
        true
    }

    /// Starts a pull. Returns false if another sync is running.
    pub fn begin_pull(&mut self) -> bool {
        if self.syncing {
            return false;
        }
        self.syncing = true;
        true
    }

    /// Ends the running sync.
    ///
    /// `pushed` is `Some(false)` if a push was attempted but did not reach
    /// the remote; its changes stay dirty until the next periodic tick.
    /// Returns the generation of a re-armed timer if writes arrived while
    /// the sync was running.
    pub fn finish(&mut self, pushed: Option<bool>) -> Option<u64> {
        self.syncing = false;
        if self.state == SchedulerState::Pushing {
            self.state = SchedulerState::Idle;
        }
        if pushed == Some(false) {
            self.dirty = true;
            return None;
        }
        if self.dirty {
            self.arm()
        } else {
            None
        }
    }

    /// Periodic tick: re-arms a push for changes a failed push left behind.
    pub fn tick(&mut self) -> Option<u64> {
        if self.dirty && !self.syncing {
            self.arm()
        } else {
            None
        }
    }

    /// Returns the push state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Returns true if remote I/O is running.
    pub fn is_syncing(&self) -> bool {
        self.syncing
    }

    /// Returns true if local changes have not been pushed yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the generation of the most recently armed timer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn arm(&mut self) -> Option<u64> {
        if self.state != SchedulerState::Idle {
            return None;
        }
        self.state = SchedulerState::Scheduled;
        self.generation += 1;
        Some(self.generation)
    }

    fn start_push(&mut self) {
        self.state = SchedulerState::Pushing;
        self.syncing = true;
        self.dirty = false;
    }
}
