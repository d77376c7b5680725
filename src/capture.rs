//! Charge/discharge sequencing and capture timer arming.
//!
//! The [`CaptureController`] is the only owner of the charge network and the capture
//! timer. It is driven strictly in alternation by the control loop:
//!
//! 1. [`begin_charge`](CaptureController::begin_charge): select the range's resistor
//!    path, zero the counter and start the timer with the range's prescaler. The
//!    capacitor starts charging immediately.
//! 2. An interrupt delivers either the captured count or an overflow.
//! 3. [`end_charge`](CaptureController::end_charge): stop the timer and drive every
//!    path to the discharge level, so the next cycle starts from a known voltage.
//!
//! Register layouts stay in the board support code, which implements
//! [`ChargeNetwork`] and [`CaptureTimer`].

use crate::range::{NetworkMask, Range};
use crate::timer::ClockSelect;

/// The resistor network that charges and discharges the part under test.
pub trait ChargeNetwork {
    /// Starts charging through the paths set in `mask`.
    ///
    /// Paths in `mask` sink current through their resistor; every other path floats.
    fn charge(&mut self, mask: NetworkMask);

    /// Drives every path to the discharge level.
    fn discharge(&mut self);
}

/// The 16-bit capture timer whose input capture is wired to the comparator.
pub trait CaptureTimer {
    /// Zeroes the counter.
    fn reset_count(&mut self);

    /// Starts counting from the given clock source with input capture and overflow
    /// interrupts live. [`ClockSelect::Stopped`] freezes the counter.
    fn set_clock(&mut self, clock: ClockSelect);
}

/// Phase of the capture hardware.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ChargeState {
    /// Timer stopped, network discharging.
    #[default]
    Discharging,
    /// Timer armed, capacitor charging.
    Charging,
}

/// Sequences the charge network and capture timer for one range at a time.
///
/// # Example
///
/// ```rust
/// use capmeter::capture::{CaptureController, CaptureTimer, ChargeNetwork};
/// use capmeter::range::{NetworkMask, RANGES};
/// use capmeter::timer::ClockSelect;
///
/// struct Net;
/// impl ChargeNetwork for Net {
///     fn charge(&mut self, _mask: NetworkMask) {}
///     fn discharge(&mut self) {}
/// }
/// struct Tc1;
/// impl CaptureTimer for Tc1 {
///     fn reset_count(&mut self) {}
///     fn set_clock(&mut self, _clock: ClockSelect) {}
/// }
///
/// let mut controller = CaptureController::new(Net, Tc1);
/// controller.begin_charge(&RANGES[4]);
/// // ... input capture or overflow interrupt ...
/// controller.end_charge();
/// ```
#[derive(Debug)]
pub struct CaptureController<N, T>
where
    N: ChargeNetwork,
    T: CaptureTimer,
{
    /// Charge/discharge network
    pub network: N,
    /// Capture timer
    pub timer: T,
    state: ChargeState,
}

impl<N, T> CaptureController<N, T>
where
    N: ChargeNetwork,
    T: CaptureTimer,
{
    /// Takes ownership of the network and timer and puts them in the discharge
    /// configuration.
    pub fn new(network: N, timer: T) -> Self {
        let mut controller = Self {
            network,
            timer,
            state: ChargeState::Discharging,
        };
        controller.disarm();
        controller
    }

    /// Current hardware phase.
    pub fn state(&self) -> ChargeState {
        self.state
    }

    /// Starts a charge cycle on `range`.
    ///
    /// The network is switched before the counter is cleared and started, so the first
    /// tick coincides with the start of charging as closely as the hardware allows.
    pub fn begin_charge(&mut self, range: &Range) {
        trace!("charge: mask={} cs={}", range.network.bits(), range.clock_select_code());
        self.network.charge(range.network);
        self.timer.reset_count();
        self.timer.set_clock(range.clock);
        self.state = ChargeState::Charging;
    }

    /// Stops the timer and discharges the capacitor.
    ///
    /// Call exactly once per cycle, after the capture event has been taken and before
    /// the next [`begin_charge`](Self::begin_charge).
    pub fn end_charge(&mut self) {
        trace!("discharge");
        self.disarm();
    }

    fn disarm(&mut self) {
        self.timer.set_clock(ClockSelect::Stopped);
        self.network.discharge();
        self.state = ChargeState::Discharging;
    }

    /// Releases the network and timer.
    pub fn release(self) -> (N, T) {
        (self.network, self.timer)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::range::RANGES;

    /// Hardware operations observed by the fakes, in order.
    #[derive(PartialEq, Eq, Clone, Copy, Debug)]
    pub(crate) enum HwOp {
        Charge(NetworkMask),
        Discharge,
        ResetCount,
        Clock(ClockSelect),
    }

    #[derive(Debug, Default)]
    pub(crate) struct FakeNetwork {
        pub(crate) ops: Vec<HwOp>,
    }

    impl ChargeNetwork for FakeNetwork {
        fn charge(&mut self, mask: NetworkMask) {
            self.ops.push(HwOp::Charge(mask));
        }
        fn discharge(&mut self) {
            self.ops.push(HwOp::Discharge);
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct FakeTimer {
        pub(crate) ops: Vec<HwOp>,
    }

    impl CaptureTimer for FakeTimer {
        fn reset_count(&mut self) {
            self.ops.push(HwOp::ResetCount);
        }
        fn set_clock(&mut self, clock: ClockSelect) {
            self.ops.push(HwOp::Clock(clock));
        }
    }

    #[test]
    fn test_new_controller_starts_discharged() {
        let controller = CaptureController::new(FakeNetwork::default(), FakeTimer::default());
        assert_eq!(controller.state(), ChargeState::Discharging);
        assert_eq!(controller.network.ops, [HwOp::Discharge]);
        assert_eq!(controller.timer.ops, [HwOp::Clock(ClockSelect::Stopped)]);
    }

    #[test]
    fn test_begin_charge_applies_range() {
        let mut controller = CaptureController::new(FakeNetwork::default(), FakeTimer::default());
        controller.begin_charge(&RANGES[6]);
        assert_eq!(controller.state(), ChargeState::Charging);

        let (network, timer) = controller.release();
        assert_eq!(
            network.ops,
            [HwOp::Discharge, HwOp::Charge(NetworkMask::R1)]
        );
        assert_eq!(
            timer.ops,
            [
                HwOp::Clock(ClockSelect::Stopped),
                HwOp::ResetCount,
                HwOp::Clock(ClockSelect::Div1),
            ]
        );
    }

    #[test]
    fn test_end_charge_stops_timer_and_discharges() {
        let mut controller = CaptureController::new(FakeNetwork::default(), FakeTimer::default());
        controller.begin_charge(&RANGES[0]);
        controller.end_charge();
        assert_eq!(controller.state(), ChargeState::Discharging);
        assert_eq!(controller.timer.ops.last(), Some(&HwOp::Clock(ClockSelect::Stopped)));
        assert_eq!(controller.network.ops.last(), Some(&HwOp::Discharge));
    }
}
