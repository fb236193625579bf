//! Filesystem-like diagnostics entries for the simulated device
//!
//! Three entries, mirroring the driver's debug interface:
//! - `error_state`: holds the first crash record captured since the
//!   last clear; reads as "no error state collected" when empty and
//!   clears on any write.
//! - `missed_irq`: decimal count of missed completion notifications;
//!   write clears.
//! - `queue_stop`: write a queue name to trigger a synthetic stop.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::device::types::NO_ERROR_STATE;

pub(crate) struct Diagnostics {
    error_state: Mutex<Option<String>>,
    missed_irq: AtomicU64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            error_state: Mutex::new(None),
            missed_irq: AtomicU64::new(0),
        }
    }

    /// Record a crash dump. Only the first record since the last clear
    /// is kept, matching driver behaviour.
    pub fn capture_error_state(&self, record: String) {
        let mut state = self.error_state.lock();
        if state.is_none() {
            *state = Some(record);
        }
    }

    pub fn read_error_state(&self) -> String {
        self.error_state
            .lock()
            .clone()
            .unwrap_or_else(|| NO_ERROR_STATE.to_string())
    }

    pub fn clear_error_state(&self) {
        *self.error_state.lock() = None;
    }

    pub fn missed_irq_count(&self) -> u64 {
        self.missed_irq.load(Ordering::SeqCst)
    }

    pub fn clear_missed_irqs(&self) {
        self.missed_irq.store(0, Ordering::SeqCst);
    }

    /// Test hook used by the notification-drop fault model
    pub fn record_missed_irq(&self) {
        self.missed_irq.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_state_lifecycle() {
        let diag = Diagnostics::new();
        assert_eq!(diag.read_error_state(), NO_ERROR_STATE);

        diag.capture_error_state("blt command stream ---".to_string());
        assert_ne!(diag.read_error_state(), NO_ERROR_STATE);

        // first capture wins
        diag.capture_error_state("render command stream ---".to_string());
        assert!(diag.read_error_state().starts_with("blt"));

        diag.clear_error_state();
        assert_eq!(diag.read_error_state(), NO_ERROR_STATE);
    }

    #[test]
    fn test_missed_irq_counter() {
        let diag = Diagnostics::new();
        assert_eq!(diag.missed_irq_count(), 0);

        diag.record_missed_irq();
        diag.record_missed_irq();
        assert_eq!(diag.missed_irq_count(), 2);

        diag.clear_missed_irqs();
        assert_eq!(diag.missed_irq_count(), 0);
    }
}
