use crate::meter::Sleep;
use embedded_hal::delay::DelayNs;

/// Waits between event-flag polls with a blocking delay instead of a low-power sleep.
///
/// For targets where entering an idle/sleep state is unavailable or undesired. Each
/// [`Sleep::sleep`] call blocks for `poll_us` microseconds and returns, after which
/// the control loop checks its flags again.
///
/// # Example
/// ```rust,ignore
/// use capmeter::timer::DelaySleep;
///
/// let mut idle = DelaySleep::new(delay, 100);
/// meter.run(&EVENTS, &mut report, &mut idle);
/// ```
///
/// # Notes
/// - Latency between an interrupt and its consumption is up to `poll_us`.
/// - Prefer a WFI/sleep-based [`Sleep`] where the core supports it.
#[derive(Debug)]
pub struct DelaySleep<D: DelayNs> {
    delay: D,
    poll_us: u32,
}

impl<D: DelayNs> DelaySleep<D> {
    /// Wraps a delay provider.
    ///
    /// # Arguments
    /// - `delay`: a delay provider implementing `DelayNs`, typically from the HAL.
    /// - `poll_us`: delay between flag polls, in microseconds.
    pub fn new(delay: D, poll_us: u32) -> Self {
        Self { delay, poll_us }
    }

    /// Releases the delay provider.
    pub fn release(self) -> D {
        self.delay
    }
}

impl<D: DelayNs> Sleep for DelaySleep<D> {
    fn sleep(&mut self) {
        self.delay.delay_us(self.poll_us);
    }
}
