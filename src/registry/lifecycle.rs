use std::sync::atomic::{AtomicU8, Ordering};

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const STOPPED: u8 = 2;

/// Registry-wide state: Running → Draining → Stopped, never backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Running,
    /// `close()` is flushing the last step
    Draining,
    /// All writes are discarded
    Stopped,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Lifecycle {
            state: AtomicU8::new(RUNNING),
        }
    }

    pub(crate) fn state(&self) -> RegistryState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => RegistryState::Running,
            DRAINING => RegistryState::Draining,
            _ => RegistryState::Stopped,
        }
    }

    #[inline]
    pub(crate) fn accepts_writes(&self) -> bool {
        self.state.load(Ordering::Acquire) != STOPPED
    }

    /// Running → Draining. False if a close is already under way or done.
    pub(crate) fn begin_drain(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, DRAINING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn stop(&self) {
        self.state.store(STOPPED, Ordering::Release);
    }
}
