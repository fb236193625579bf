//! Crash-record capture against the simulated device

use wringer_device::{Device, DeviceContext, DiagEntry, Queue, SimConfig, SimDevice, NO_ERROR_STATE};
use wringer_harness::crashdump::{self, MatchMode};
use wringer_harness::{hang, Harness};

/// Faulting either queue with capture produces a record that names
/// the queue, carries the batch address and dumps all 1024 words
#[test]
fn test_capture_validates_on_both_queues() {
    for queue in Queue::ALL {
        let device = SimDevice::default();
        let h = Harness::open(&device).unwrap();
        hang::capture_crash_record(&h, queue).unwrap();
        // validation clears the record for the next case
        assert_eq!(h.ctx().diag_read(DiagEntry::ErrorState).unwrap(), NO_ERROR_STATE);
    }
}

#[test]
fn test_record_shape() {
    let device = SimDevice::default();
    let h = Harness::open(&device).unwrap();

    let ticket = h.ctx().submit_spin(Queue::Blt, true).unwrap();
    h.ctx().wait_recovered(&ticket).unwrap();
    let record = h.ctx().diag_read(DiagEntry::ErrorState).unwrap();
    h.ctx().close_buffer(ticket.batch).unwrap();

    let sections = crashdump::parse(&record).unwrap();
    let blt = sections.iter().find(|s| s.label == "blt").unwrap();
    assert_eq!(blt.gtt_offset, ticket.addr);
    assert_eq!(blt.words.len(), 1024);
    // batch head: loop command, then the batch's own address
    assert_eq!(blt.words[1], ticket.addr as u32);
    assert_eq!(blt.words[2], (ticket.addr >> 32) as u32);
}

/// With a command parser rewriting addresses, validation must fall
/// back to content-only matching and still succeed
#[test]
fn test_content_only_matching_with_command_parser() {
    let device = SimDevice::new(SimConfig::with_command_parser());
    let h = Harness::open(&device).unwrap();
    assert_eq!(crashdump::mode_for(h.caps()), MatchMode::ContentOnly);

    hang::capture_crash_record(&h, Queue::Render).unwrap();
}

#[test]
fn test_error_state_lifecycle() {
    let device = SimDevice::default();
    let h = Harness::open(&device).unwrap();

    // idle baseline
    hang::check_error_state_clear(&h).unwrap();

    // first fault wins, later faults do not replace it
    let first = h.ctx().submit_spin(Queue::Blt, true).unwrap();
    h.ctx().wait_recovered(&first).unwrap();
    let record = h.ctx().diag_read(DiagEntry::ErrorState).unwrap();

    let second = h.ctx().submit_spin(Queue::Render, true).unwrap();
    h.ctx().wait_recovered(&second).unwrap();
    assert_eq!(h.ctx().diag_read(DiagEntry::ErrorState).unwrap(), record);

    // any write clears
    h.ctx().diag_write(DiagEntry::ErrorState, b"1").unwrap();
    assert_eq!(h.ctx().diag_read(DiagEntry::ErrorState).unwrap(), NO_ERROR_STATE);

    h.ctx().close_buffer(first.batch).unwrap();
    h.ctx().close_buffer(second.batch).unwrap();
}

/// The queue-stop diagnostics entry produces a record attributed to
/// the named queue
#[test]
fn test_queue_stop_attribution() {
    let device = SimDevice::default();
    let ctx: Box<dyn DeviceContext> = device.open().unwrap();

    ctx.diag_write(DiagEntry::QueueStop, b"render").unwrap();
    let record = ctx.diag_read(DiagEntry::ErrorState).unwrap();

    let sections = crashdump::parse(&record).unwrap();
    assert!(sections.iter().any(|s| s.label == "render"));
}
