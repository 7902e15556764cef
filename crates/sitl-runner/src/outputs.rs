//! Servo output table written by the firmware.

use parking_lot::{Mutex, MutexGuard};
use sitl_common::{NUM_CHANNELS, PWM_INACTIVE};
use std::sync::atomic::{AtomicBool, Ordering};

/// Raw channel values as last written by the firmware's output driver.
///
/// The firmware side writes through [`write_outputs`](Self::write_outputs)
/// and flags readiness once its mixers are running. The step driver locks the
/// table while building the model input, and may replace its contents with
/// disarmed defaults until the firmware reports ready.
#[derive(Debug)]
pub struct ServoOutputs {
    pwm: Mutex<[u16; NUM_CHANNELS]>,
    ready: AtomicBool,
}

impl ServoOutputs {
    /// Create a table with every channel inactive.
    pub fn new() -> Self {
        ServoOutputs {
            pwm: Mutex::new([PWM_INACTIVE; NUM_CHANNELS]),
            ready: AtomicBool::new(false),
        }
    }

    /// Write consecutive channel values starting at `first`.
    ///
    /// Values past the last channel are ignored.
    pub fn write_outputs(&self, first: usize, values: &[u16]) {
        let mut pwm = self.pwm.lock();
        for (slot, &value) in pwm.iter_mut().skip(first).zip(values) {
            *slot = value;
        }
    }

    /// Mark whether the firmware is producing valid outputs.
    pub fn set_output_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Whether the firmware is producing valid outputs.
    pub fn output_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> [u16; NUM_CHANNELS] {
        *self.pwm.lock()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, [u16; NUM_CHANNELS]> {
        self.pwm.lock()
    }
}

impl Default for ServoOutputs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_outputs_offset() {
        let outputs = ServoOutputs::new();
        outputs.write_outputs(2, &[1100, 1200]);
        let pwm = outputs.snapshot();
        assert_eq!(pwm[1], PWM_INACTIVE);
        assert_eq!(pwm[2], 1100);
        assert_eq!(pwm[3], 1200);
    }

    #[test]
    fn test_write_past_end_ignored() {
        let outputs = ServoOutputs::new();
        outputs.write_outputs(30, &[1, 2, 3, 4]);
        let pwm = outputs.snapshot();
        assert_eq!(pwm[30], 1);
        assert_eq!(pwm[31], 2);
    }

    #[test]
    fn test_ready_flag() {
        let outputs = ServoOutputs::new();
        assert!(!outputs.output_ready());
        outputs.set_output_ready(true);
        assert!(outputs.output_ready());
    }
}
