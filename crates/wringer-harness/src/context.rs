//! Per-run harness context
//!
//! Wraps one device connection together with the run state that
//! access strategies need: the capability report and the current pass
//! number, which rotates the sampled element within each row so
//! repeated passes touch different cachelines.

use wringer_device::{Device, DeviceCaps, DeviceContext, DeviceError, DiagEntry};

use crate::error::{CaseError, Result};

pub struct Harness {
    ctx: Box<dyn DeviceContext>,
    caps: DeviceCaps,
    /// Current pass within a multi-pass wrapper; rotates sampling
    pub pass: u32,
}

impl Harness {
    /// Open a fresh connection to the device
    pub fn open(device: &dyn Device) -> Result<Self> {
        let ctx = device.open()?;
        let caps = ctx.caps();
        Ok(Self { ctx, caps, pass: 0 })
    }

    pub fn ctx(&self) -> &dyn DeviceContext {
        self.ctx.as_ref()
    }

    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    /// Element index sampled for row `y` on the current pass
    pub fn sample_index(&self, y: usize, width: usize) -> usize {
        y * width + (y + self.pass as usize) % width
    }

    /// Reset the missed-notification counter
    pub fn clear_missed_notifications(&self) -> Result<()> {
        Ok(self.ctx.diag_write(DiagEntry::MissedIrq, b"0")?)
    }

    /// Current missed-notification count
    pub fn missed_notifications(&self) -> Result<u64> {
        let text = self.ctx.diag_read(DiagEntry::MissedIrq)?;
        text.trim().parse().map_err(|_| {
            CaseError::Device(DeviceError::BadDiagInput {
                entry: DiagEntry::MissedIrq.name().to_string(),
                reason: format!("unparseable counter {text:?}"),
            })
        })
    }

    /// Every wrapper ends with this: a run that lost notifications is
    /// a failure even when all content checks passed
    pub fn check_missed_notifications(&self) -> Result<()> {
        let count = self.missed_notifications()?;
        if count != 0 {
            self.clear_missed_notifications()?;
            return Err(CaseError::MissedNotifications { count });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wringer_device::{SimConfig, SimDevice};

    #[test]
    fn test_sample_index_rotates_with_pass() {
        let device = SimDevice::default();
        let mut h = Harness::open(&device).unwrap();

        assert_eq!(h.sample_index(0, 512), 0);
        assert_eq!(h.sample_index(2, 512), 2 * 512 + 2);

        h.pass = 3;
        assert_eq!(h.sample_index(0, 512), 3);
        assert_eq!(h.sample_index(511, 512), 511 * 512 + (511 + 3) % 512);
    }

    #[test]
    fn test_missed_notification_check() {
        let device = SimDevice::new(SimConfig::dropping_notifications());
        let h = Harness::open(&device).unwrap();
        h.clear_missed_notifications().unwrap();
        assert!(h.check_missed_notifications().is_ok());

        let bo = h.ctx().create(wringer_device::MemKind::Normal, 64).unwrap();
        h.ctx()
            .submit_fill(
                wringer_device::Queue::Blt,
                bo,
                0,
                &wringer_device::FillParams {
                    row_bytes: 64,
                    rows: 1,
                    stride: 64,
                    tiled: false,
                },
            )
            .unwrap();
        h.ctx().quiesce().unwrap();

        assert!(matches!(
            h.check_missed_notifications(),
            Err(CaseError::MissedNotifications { count: 1 })
        ));
        // the failed check clears the counter for the next run
        assert_eq!(h.missed_notifications().unwrap(), 0);
    }
}
