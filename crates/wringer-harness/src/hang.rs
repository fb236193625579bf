//! Fault injection and crash-record capture
//!
//! A hang variant stalls one queue with an endless batch while the
//! scenario keeps submitting work; recovery must leave every content
//! check intact. Capture goes further: the crash record pulled from
//! diagnostics must describe exactly the batch that faulted.

use wringer_device::{DeviceCaps, DiagEntry, Queue, SpinTicket, NO_ERROR_STATE};

use crate::context::Harness;
use crate::crashdump;
use crate::error::{CaseError, Result};

/// Which queue, if any, gets an endless batch injected mid-scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangKind {
    None,
    Blt,
    Render,
}

impl HangKind {
    pub const ALL: [HangKind; 3] = [HangKind::None, HangKind::Blt, HangKind::Render];

    pub const fn suffix(self) -> &'static str {
        match self {
            HangKind::None => "",
            HangKind::Blt => "-hang-blt",
            HangKind::Render => "-hang-render",
        }
    }

    pub const fn queue(self) -> Option<Queue> {
        match self {
            HangKind::None => None,
            HangKind::Blt => Some(Queue::Blt),
            HangKind::Render => Some(Queue::Render),
        }
    }

    pub fn check(self, caps: &DeviceCaps) -> Option<String> {
        match self.queue() {
            Some(queue) if !caps.has_queue(queue) => Some(format!("device has no {queue} queue")),
            _ => None,
        }
    }

    /// Stall the queue. The guard must be confirmed once the
    /// scenario's checks are done.
    pub fn inject(self, h: &Harness) -> Result<HangGuard> {
        let ticket = match self.queue() {
            None => None,
            Some(queue) => Some(h.ctx().submit_spin(queue, false)?),
        };
        Ok(HangGuard { ticket })
    }
}

/// Receipt for an injected hang
#[must_use = "an injected hang must be confirmed recovered"]
pub struct HangGuard {
    ticket: Option<SpinTicket>,
}

impl HangGuard {
    /// Wait for the queue to recover and release the batch
    pub fn confirm(self, h: &Harness) -> Result<()> {
        if let Some(ticket) = self.ticket {
            h.ctx().wait_recovered(&ticket)?;
            h.ctx().close_buffer(ticket.batch)?;
        }
        Ok(())
    }
}

/// Baseline diagnostics behaviour: an idle device reports no error
/// state, and writes keep it clear
pub fn check_error_state_clear(h: &Harness) -> Result<()> {
    h.ctx().diag_write(DiagEntry::ErrorState, b"")?;
    let text = h.ctx().diag_read(DiagEntry::ErrorState)?;
    if text != NO_ERROR_STATE {
        return Err(CaseError::CrashRecordMismatch(format!(
            "idle device reported an error state: {:?}",
            text.lines().next().unwrap_or("")
        )));
    }
    Ok(())
}

/// Fault one queue with capture enabled and validate the resulting
/// crash record against the batch that was actually submitted
pub fn capture_crash_record(h: &Harness, queue: Queue) -> Result<()> {
    h.ctx().diag_write(DiagEntry::ErrorState, b"")?;

    let ticket = h.ctx().submit_spin(queue, true)?;
    h.ctx().wait_recovered(&ticket)?;

    let size = h.ctx().buffer_size(ticket.batch)?;
    let mut bytes = vec![0u8; size];
    h.ctx().pread(ticket.batch, 0, &mut bytes)?;
    let words: Vec<u32> = bytemuck::cast_slice(&bytes).to_vec();
    h.ctx().close_buffer(ticket.batch)?;

    let record = h.ctx().diag_read(DiagEntry::ErrorState)?;
    if record == NO_ERROR_STATE {
        return Err(CaseError::CrashRecordMismatch(
            "no crash record was captured for the fault".to_string(),
        ));
    }
    tracing::debug!(%queue, addr = ticket.addr, lines = record.lines().count(), "validating crash record");

    let mode = crashdump::mode_for(h.caps());
    crashdump::validate(&record, queue, ticket.addr, &words, mode)?;

    h.ctx().diag_write(DiagEntry::ErrorState, b"")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wringer_device::SimDevice;

    #[test]
    fn test_hang_suffixes() {
        assert_eq!(HangKind::None.suffix(), "");
        assert_eq!(HangKind::Blt.suffix(), "-hang-blt");
        assert_eq!(HangKind::Render.suffix(), "-hang-render");
        assert_eq!(HangKind::None.queue(), None);
    }

    #[test]
    fn test_inject_and_confirm() {
        let device = SimDevice::default();
        let h = Harness::open(&device).unwrap();

        let guard = HangKind::Blt.inject(&h).unwrap();
        guard.confirm(&h).unwrap();

        // no capture was requested, so the error state stays clean
        check_error_state_clear(&h).unwrap();
    }
}
