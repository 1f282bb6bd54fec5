//! Cooperative cancellation for the active run.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Stop signal shared between a run's worker and any stop source.
///
/// One controller is created per run. Setting it never interrupts the action
/// that is currently executing; the run state machine polls it before each
/// step.
#[derive(Debug, Clone, Default)]
pub struct StopController {
    /// Set once a stop is requested.
    flag: Arc<AtomicBool>,
}

impl StopController {
    /// A fresh controller with no stop pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent and callable from any thread; returns true
    /// only for the call that actually set the flag.
    pub fn request_stop(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    /// Non-blocking poll of the stop flag.
    pub fn should_stop(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn request_is_idempotent() {
        let stop = StopController::new();
        assert!(!stop.should_stop());
        assert!(stop.request_stop());
        assert!(!stop.request_stop());
        assert!(stop.should_stop());
    }

    #[test]
    fn visible_across_threads() {
        let stop = StopController::new();
        let remote = stop.clone();
        thread::spawn(move || remote.request_stop())
            .join()
            .expect("join");
        assert!(stop.should_stop());
    }
}
