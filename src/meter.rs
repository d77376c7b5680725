//! The measurement control loop.
//!
//! [`CapMeter`] ties the capture controller, converter and range selector together
//! and walks one cycle through a fixed sequence of phases:
//!
//! ```text
//! Charging -> Discharging -> Reporting -> Reranging -> WaitingForRefresh -> Charging ...
//! ```
//!
//! Only `Charging` (waiting for a capture or overflow) and `WaitingForRefresh` (waiting
//! for the report period) ever wait; every other phase runs straight through.
//!
//! The loop can be driven two ways:
//! - [`CapMeter::poll`]: non-blocking, returns `nb::Error::WouldBlock` while waiting,
//!   suitable for a superloop that does other work
//! - [`CapMeter::measure`] / [`CapMeter::run`]: blocking, suspends through a [`Sleep`]
//!   implementation (a WFI/sleep instruction, or [`DelaySleep`](crate::timer) with the
//!   `delay-loop` feature) between polls
//!
//! ## Example
//!
//! ```rust
//! # use capmeter::capture::{CaptureTimer, ChargeNetwork};
//! # use capmeter::range::NetworkMask;
//! # use capmeter::timer::ClockSelect;
//! # use embedded_hal_mock::eh1::digital::Mock as Pin;
//! # struct Net;
//! # impl ChargeNetwork for Net {
//! #     fn charge(&mut self, _mask: NetworkMask) {}
//! #     fn discharge(&mut self) {}
//! # }
//! # struct Tc1;
//! # impl CaptureTimer for Tc1 {
//! #     fn reset_count(&mut self) {}
//! #     fn set_clock(&mut self, _clock: ClockSelect) {}
//! # }
//! use capmeter::events::EventChannel;
//! use capmeter::meter::{CapMeter, MeterConfig};
//! use capmeter::range::RangeTable;
//! use capmeter::report::TextReport;
//!
//! static EVENTS: EventChannel = EventChannel::new();
//!
//! let mut meter: CapMeter<'_, Net, Tc1, Pin> =
//!     CapMeter::new(RangeTable::builtin(), Net, Tc1, None, MeterConfig::default()).unwrap();
//! let mut report = TextReport::new(String::new(), true);
//!
//! // Interrupts would normally do this.
//! EVENTS.capture_complete(24226);
//! EVENTS.refresh_elapsed();
//!
//! let m = meter.measure(&EVENTS, &mut report, &mut || {}).unwrap();
//! assert_eq!(m.range_index, 4);
//! ```

use embedded_hal::digital::OutputPin;

use crate::autorange::{RangePolicy, RangeSelector};
use crate::capture::{CaptureController, CaptureTimer, ChargeNetwork};
use crate::consts::{
    DEFAULT_RANGE_INDEX, REFERENCE_CLOCK_HZ, SUPPLY_VOLTS, TRIP_VOLTS, ZERO_THRESHOLD_FARADS,
};
use crate::convert::{Calibration, Converter, Measurement};
use crate::error::Error;
use crate::events::{EventChannel, RawCapture};
use crate::range::RangeTable;
use crate::report::Report;

/// Low-power wait used between polls of the event flags.
///
/// Implementations return once an interrupt may have raised a flag: typically after a
/// `sleep`/`wfi` instruction, which any interrupt wakes from.
pub trait Sleep {
    /// Suspends until the next interrupt (or a bounded delay).
    fn sleep(&mut self);
}

impl<F> Sleep for F
where
    F: FnMut(),
{
    fn sleep(&mut self) {
        self()
    }
}

/// Meter configuration.
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct MeterConfig {
    /// Clock feeding the capture timer prescaler, in Hz.
    pub reference_clock_hz: u32,
    /// Range used by the first cycle.
    pub start_index: usize,
    /// Autoranging law.
    pub policy: RangePolicy,
    /// Largest finest-range reading latched as the zero offset, in farads.
    pub zero_threshold_farads: f32,
    /// Rail the capacitor charges from, in volts.
    pub supply_volts: f32,
    /// Comparator trip voltage, in volts.
    pub trip_volts: f32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            reference_clock_hz: REFERENCE_CLOCK_HZ,
            start_index: DEFAULT_RANGE_INDEX,
            policy: RangePolicy::Stepwise,
            zero_threshold_farads: ZERO_THRESHOLD_FARADS,
            supply_volts: SUPPLY_VOLTS,
            trip_volts: TRIP_VOLTS,
        }
    }
}

impl MeterConfig {
    /// Checks the configuration against a range table.
    ///
    /// # Errors
    /// - [`Error::EmptyTable`] if `table` has no ranges
    /// - [`Error::InvalidRange`] if `start_index` is outside `table`
    /// - [`Error::InvalidVoltages`] unless `0 < trip_volts < supply_volts`
    pub fn validate<E: core::fmt::Debug>(&self, table: &RangeTable<'_>) -> Result<(), Error<E>> {
        if table.is_empty() {
            warn!("empty range table");
            return Err(Error::EmptyTable);
        }
        if self.start_index >= table.len() {
            warn!("start range {} outside table of {}", self.start_index, table.len());
            return Err(Error::InvalidRange {
                index: self.start_index,
                len: table.len(),
            });
        }
        if !(self.trip_volts > 0.0 && self.supply_volts > self.trip_volts) {
            warn!(
                "trip voltage {} outside (0, {})",
                self.trip_volts,
                self.supply_volts
            );
            return Err(Error::InvalidVoltages);
        }
        Ok(())
    }

    /// Builds the converter for this front end.
    pub fn converter(&self) -> Converter {
        Converter::new(
            self.reference_clock_hz,
            Converter::time_constant_factor_for(self.supply_volts, self.trip_volts),
            self.zero_threshold_farads,
        )
    }
}

/// Mutable state carried from cycle to cycle.
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct CycleState {
    /// Active range; only the range selector changes it, between cycles.
    pub range_index: usize,
    /// Zero-offset calibration.
    pub calibration: Calibration,
}

/// Control loop phase.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Phase {
    /// Capture armed, waiting for a capture or overflow event.
    Charging,
    /// Capture disarmed, network discharging.
    Discharging,
    /// Converting and emitting the record.
    Reporting,
    /// Choosing the next range.
    Reranging,
    /// Waiting for the refresh tick.
    WaitingForRefresh,
}

/// Phase plus the data it carries forward.
#[derive(PartialEq, Clone, Copy, Debug)]
enum Stage {
    Charging { armed: bool },
    Discharging(RawCapture),
    Reporting(RawCapture),
    Reranging(RawCapture, Measurement),
    WaitingForRefresh(Measurement),
}

/// Autoranging capacitance meter.
///
/// ## Type Parameters
///
/// - `N`: the charge/discharge network, see [`ChargeNetwork`]
/// - `T`: the capture timer, see [`CaptureTimer`]
/// - `L`: an optional status indicator implementing [`OutputPin`]: high after a
///   cycle that measured a capacitance, low after an overflow
#[derive(Debug)]
pub struct CapMeter<'t, N, T, L>
where
    N: ChargeNetwork,
    T: CaptureTimer,
    L: OutputPin,
{
    table: RangeTable<'t>,
    controller: CaptureController<N, T>,
    selector: RangeSelector,
    converter: Converter,
    state: CycleState,
    stage: Stage,
    /// Status indicator pin
    pub status: Option<L>,
}

impl<'t, N, T, L> CapMeter<'t, N, T, L>
where
    N: ChargeNetwork,
    T: CaptureTimer,
    L: OutputPin,
{
    /// Creates a meter. The network is put in its discharge configuration; nothing is
    /// armed until the first [`poll`](Self::poll).
    ///
    /// # Arguments
    /// - `table`: ranges, coarsest first
    /// - `network`: charge/discharge network
    /// - `timer`: capture timer
    /// - `status`: optional status indicator
    /// - `config`: see [`MeterConfig`]
    ///
    /// # Errors
    /// - whatever [`MeterConfig::validate`] rejects
    pub fn new(
        table: RangeTable<'t>,
        network: N,
        timer: T,
        status: Option<L>,
        config: MeterConfig,
    ) -> Result<Self, Error<L::Error>> {
        config.validate(&table)?;
        Ok(Self {
            table,
            controller: CaptureController::new(network, timer),
            selector: RangeSelector::new(config.policy),
            converter: config.converter(),
            state: CycleState {
                range_index: config.start_index,
                calibration: Calibration::new(),
            },
            stage: Stage::Charging { armed: false },
            status,
        })
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        match self.stage {
            Stage::Charging { .. } => Phase::Charging,
            Stage::Discharging(_) => Phase::Discharging,
            Stage::Reporting(_) => Phase::Reporting,
            Stage::Reranging(..) => Phase::Reranging,
            Stage::WaitingForRefresh(_) => Phase::WaitingForRefresh,
        }
    }

    /// Cycle state (active range and calibration).
    pub fn state(&self) -> &CycleState {
        &self.state
    }

    /// Active range index.
    pub fn range_index(&self) -> usize {
        self.state.range_index
    }

    /// The range table.
    pub fn table(&self) -> &RangeTable<'t> {
        &self.table
    }

    /// The capture controller.
    pub fn controller(&self) -> &CaptureController<N, T> {
        &self.controller
    }

    /// Advances the cycle as far as the pending events allow.
    ///
    /// # Returns
    /// - `Ok(measurement)` when a full cycle has completed (the refresh tick was taken);
    ///   the next call starts a new charge
    /// - `Err(nb::Error::WouldBlock)` while waiting for a capture or the refresh tick
    /// - `Err(nb::Error::Other(_))` if the status pin or report sink failed; the record
    ///   is still handed to the sink and the cycle carries on with the next call. A pin
    ///   failure is returned in preference to a sink failure
    pub fn poll<R: Report>(
        &mut self,
        events: &EventChannel,
        sink: &mut R,
    ) -> nb::Result<Measurement, Error<L::Error>> {
        loop {
            match self.stage {
                Stage::Charging { armed } => {
                    if !armed {
                        let range = self.table.range_at(self.state.range_index);
                        self.controller.begin_charge(range);
                        self.stage = Stage::Charging { armed: true };
                    }
                    match events.take_capture() {
                        Some(raw) => self.stage = Stage::Discharging(raw),
                        None => return Err(nb::Error::WouldBlock),
                    }
                }
                Stage::Discharging(raw) => {
                    self.controller.end_charge();
                    self.stage = Stage::Reporting(raw);
                }
                Stage::Reporting(raw) => {
                    let m = self.converter.convert(
                        &self.table,
                        self.state.range_index,
                        raw,
                        &mut self.state.calibration,
                    );
                    self.stage = Stage::Reranging(raw, m);
                    // The record goes out even if the indicator fails.
                    let shown = self.indicate(&m);
                    let reported = sink.report(&m).map_err(Error::<L::Error>::from);
                    shown?;
                    reported?;
                }
                Stage::Reranging(raw, m) => {
                    let _ = self
                        .selector
                        .select(&self.table, &mut self.state.range_index, raw);
                    self.stage = Stage::WaitingForRefresh(m);
                }
                Stage::WaitingForRefresh(m) => {
                    if !events.take_refresh() {
                        return Err(nb::Error::WouldBlock);
                    }
                    self.stage = Stage::Charging { armed: false };
                    return Ok(m);
                }
            }
        }
    }

    /// Runs one full cycle, sleeping whenever it has to wait.
    ///
    /// # Errors
    /// - the first status pin or report sink failure
    pub fn measure<R: Report, S: Sleep>(
        &mut self,
        events: &EventChannel,
        sink: &mut R,
        idle: &mut S,
    ) -> Result<Measurement, Error<L::Error>> {
        loop {
            match self.poll(events, sink) {
                Ok(m) => return Ok(m),
                Err(nb::Error::WouldBlock) => idle.sleep(),
                Err(nb::Error::Other(e)) => return Err(e),
            }
        }
    }

    /// Measures forever. Collaborator failures are logged and the loop carries on.
    pub fn run<R: Report, S: Sleep>(
        &mut self,
        events: &EventChannel,
        sink: &mut R,
        idle: &mut S,
    ) -> ! {
        loop {
            match self.measure(events, sink, idle) {
                Ok(_) => {}
                Err(Error::Pin(_)) => warn!("status pin write failed"),
                Err(_) => warn!("report sink failed"),
            }
        }
    }

    fn indicate(&mut self, m: &Measurement) -> Result<(), Error<L::Error>> {
        if let Some(ref mut status) = self.status {
            if m.is_overflow() {
                status.set_low().map_err(Error::Pin)?;
            } else {
                status.set_high().map_err(Error::Pin)?;
            }
        }
        Ok(())
    }

    /// Releases the network, timer and status pin.
    pub fn release(self) -> (N, T, Option<L>) {
        let (network, timer) = self.controller.release();
        (network, timer, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ChargeState;
    use crate::capture::tests::{FakeNetwork, FakeTimer, HwOp};
    use crate::convert::Capacitance;
    use crate::range::NetworkMask;
    use crate::timer::ClockSelect;
    use core::fmt;
    use embedded_hal_mock::eh1::MockError;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use std::io::ErrorKind;

    type Meter = CapMeter<'static, FakeNetwork, FakeTimer, PinMock>;

    fn meter(status: Option<PinMock>, config: MeterConfig) -> Meter {
        CapMeter::new(
            RangeTable::builtin(),
            FakeNetwork::default(),
            FakeTimer::default(),
            status,
            config,
        )
        .unwrap()
    }

    fn collect(records: &mut Vec<Measurement>) -> impl FnMut(&Measurement) -> fmt::Result + '_ {
        move |m: &Measurement| {
            records.push(*m);
            Ok(())
        }
    }

    fn discard(_: &Measurement) -> fmt::Result {
        Ok(())
    }

    #[test]
    fn test_rejects_start_index_outside_table() {
        let config = MeterConfig {
            start_index: 9,
            ..MeterConfig::default()
        };
        let result = CapMeter::<FakeNetwork, FakeTimer, PinMock>::new(
            RangeTable::builtin(),
            FakeNetwork::default(),
            FakeTimer::default(),
            None,
            config,
        );
        assert!(matches!(
            result,
            Err(Error::InvalidRange { index: 9, len: 9 })
        ));
    }

    #[test]
    fn test_default_config_starts_mid_table() {
        let m = meter(None, MeterConfig::default());
        assert_eq!(m.range_index(), 4);
        assert_eq!(m.phase(), Phase::Charging);
        assert!(!m.state().calibration.is_zeroed());
        assert_eq!(m.controller().state(), ChargeState::Discharging);
    }

    #[test]
    fn test_full_cycle_runs_phases_in_order() {
        let events = EventChannel::new();
        let mut records = Vec::new();
        let mut m = meter(None, MeterConfig::default());

        {
            let mut sink = collect(&mut records);
            assert!(matches!(m.poll(&events, &mut sink), Err(nb::Error::WouldBlock)));
        }
        assert_eq!(m.phase(), Phase::Charging);
        assert_eq!(m.controller().state(), ChargeState::Charging);
        assert_eq!(
            m.controller().network.ops.last(),
            Some(&HwOp::Charge(NetworkMask::R0))
        );
        assert_eq!(m.controller().timer.ops.last(), Some(&HwOp::Clock(ClockSelect::Div1)));

        // A second poll while still charging must not re-arm.
        {
            let mut sink = collect(&mut records);
            assert!(matches!(m.poll(&events, &mut sink), Err(nb::Error::WouldBlock)));
        }
        assert_eq!(m.controller().timer.ops.len(), 3);

        events.capture_complete(14155);
        {
            let mut sink = collect(&mut records);
            assert!(matches!(m.poll(&events, &mut sink), Err(nb::Error::WouldBlock)));
        }
        // Reported and reranged before waiting for the refresh tick.
        assert_eq!(m.phase(), Phase::WaitingForRefresh);
        assert_eq!(m.controller().state(), ChargeState::Discharging);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].range_index, 4);
        assert_eq!(records[0].raw, RawCapture::Ticks(14155));
        assert_eq!(m.range_index(), 5);

        events.refresh_elapsed();
        let done = {
            let mut sink = collect(&mut records);
            m.poll(&events, &mut sink)
        };
        assert_eq!(done.ok().map(|r| r.raw), Some(RawCapture::Ticks(14155)));
        assert_eq!(m.phase(), Phase::Charging);

        // Next cycle arms on the new range.
        {
            let mut sink = collect(&mut records);
            assert!(matches!(m.poll(&events, &mut sink), Err(nb::Error::WouldBlock)));
        }
        assert_eq!(
            m.controller().network.ops.last(),
            Some(&HwOp::Charge(NetworkMask::R1))
        );
        assert_eq!(m.controller().timer.ops.last(), Some(&HwOp::Clock(ClockSelect::Div8)));
    }

    #[test]
    fn test_early_refresh_waits_for_its_phase() {
        let events = EventChannel::new();
        let mut records = Vec::new();
        let mut m = meter(None, MeterConfig::default());
        let mut sink = collect(&mut records);

        assert!(matches!(m.poll(&events, &mut sink), Err(nb::Error::WouldBlock)));
        events.refresh_elapsed();
        assert!(matches!(m.poll(&events, &mut sink), Err(nb::Error::WouldBlock)));
        assert_eq!(m.phase(), Phase::Charging);
        assert!(events.refresh_pending());

        events.capture_complete(20000);
        let done = m.poll(&events, &mut sink);
        assert!(done.is_ok());
        assert!(!events.refresh_pending());
        assert_eq!(m.range_index(), 4);
    }

    #[test]
    fn test_overflow_at_coarsest_range_stays_put() {
        let events = EventChannel::new();
        let config = MeterConfig {
            start_index: 0,
            ..MeterConfig::default()
        };
        let status = PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let mut m = meter(Some(status), config);

        events.capture_overflow();
        events.refresh_elapsed();
        let result = m.measure(&events, &mut discard, &mut || {});
        let measurement = result.unwrap();
        assert!(measurement.is_overflow());
        assert!(matches!(measurement.capacitance, Capacitance::Overflow { .. }));
        assert_eq!(m.range_index(), 0);

        let (_, _, status) = m.release();
        let _ = status.map(|mut s| s.done());
    }

    #[test]
    fn test_status_pin_follows_outcome() {
        let events = EventChannel::new();
        let status = PinMock::new(&[
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ]);
        let mut m = meter(Some(status), MeterConfig::default());
        let mut sink = discard;

        events.capture_complete(30000);
        events.refresh_elapsed();
        let _ = m.measure(&events, &mut sink, &mut || {}).unwrap();

        events.capture_overflow();
        events.refresh_elapsed();
        let _ = m.measure(&events, &mut sink, &mut || {}).unwrap();
        assert_eq!(m.range_index(), 3);

        if let Some(s) = m.status.as_mut() {
            s.done();
        }
    }

    #[test]
    fn test_zeroes_on_finest_range_then_subtracts() {
        let events = EventChannel::new();
        let config = MeterConfig {
            start_index: 8,
            ..MeterConfig::default()
        };
        let mut m = meter(None, config);
        let mut records = Vec::new();
        let mut sink = collect(&mut records);

        // ~50 pF of stray capacitance
        events.capture_complete(1211);
        events.refresh_elapsed();
        let first = m.measure(&events, &mut sink, &mut || {}).unwrap();
        assert!(first.zero_latched);
        assert_eq!(first.capacitance, Capacitance::Farads(0.0));
        assert!(m.state().calibration.is_zeroed());

        // ~60 pF
        events.capture_complete(1453);
        events.refresh_elapsed();
        let second = m.measure(&events, &mut sink, &mut || {}).unwrap();
        let c = second.capacitance.farads();
        assert!(c > 9.9e-12 && c < 10.1e-12);
        assert_eq!(
            m.state().calibration.zero_offset_farads(),
            first.zero_offset_farads
        );
    }

    #[test]
    fn test_blocking_measure_sleeps_until_events_arrive() {
        static EVENTS: EventChannel = EventChannel::new();
        let mut m = meter(None, MeterConfig::default());
        let mut sleeps = 0;
        let mut idle = || {
            sleeps += 1;
            match sleeps {
                2 => EVENTS.capture_complete(40000),
                4 => EVENTS.refresh_elapsed(),
                _ => {}
            }
        };
        let result = m.measure(&EVENTS, &mut discard, &mut idle);
        assert_eq!(result.ok().map(|r| r.raw), Some(RawCapture::Ticks(40000)));
        assert_eq!(sleeps, 4);
    }

    #[test]
    fn test_sink_failure_surfaces_but_cycle_continues() {
        let events = EventChannel::new();
        let mut m = meter(None, MeterConfig::default());
        let mut failing = |_: &Measurement| -> fmt::Result { Err(fmt::Error) };

        events.capture_complete(100);
        assert!(matches!(
            m.poll(&events, &mut failing),
            Err(nb::Error::Other(Error::Report))
        ));
        assert_eq!(m.phase(), Phase::Reranging);

        events.refresh_elapsed();
        assert!(m.poll(&events, &mut failing).is_ok());
        assert_eq!(m.range_index(), 5);
    }

    #[test]
    fn test_quick_policy_is_opt_in() {
        let events = EventChannel::new();
        let config = MeterConfig {
            start_index: 6,
            policy: RangePolicy::Quick,
            ..MeterConfig::default()
        };
        let mut m = meter(None, config);
        events.capture_overflow();
        events.refresh_elapsed();
        let _ = m.measure(&events, &mut discard, &mut || {});
        assert_eq!(m.range_index(), 1);
    }

    #[test]
    fn test_rejects_trip_voltage_at_or_above_supply() {
        for (supply_volts, trip_volts) in [(1.0, 1.1), (1.1, 1.1), (5.0, 0.0), (5.0, -1.0)] {
            let config = MeterConfig {
                supply_volts,
                trip_volts,
                ..MeterConfig::default()
            };
            let result = CapMeter::<FakeNetwork, FakeTimer, PinMock>::new(
                RangeTable::builtin(),
                FakeNetwork::default(),
                FakeTimer::default(),
                None,
                config,
            );
            assert!(matches!(result, Err(Error::InvalidVoltages)));
        }
        assert!(
            MeterConfig::default()
                .validate::<()>(&RangeTable::builtin())
                .is_ok()
        );
    }

    #[test]
    fn test_default_converter_matches_default_config() {
        assert_eq!(MeterConfig::default().converter(), Converter::default());
    }

    #[test]
    fn test_pin_failure_still_reports_the_cycle() {
        let events = EventChannel::new();
        let status = PinMock::new(&[
            PinTransaction::set(PinState::High).with_error(MockError::Io(ErrorKind::Other)),
        ]);
        let mut m = meter(Some(status), MeterConfig::default());
        let mut records = Vec::new();

        events.capture_complete(20000);
        {
            let mut sink = collect(&mut records);
            assert!(matches!(
                m.poll(&events, &mut sink),
                Err(nb::Error::Other(Error::Pin(_)))
            ));
        }
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].raw, RawCapture::Ticks(20000));

        events.refresh_elapsed();
        {
            let mut sink = collect(&mut records);
            assert!(m.poll(&events, &mut sink).is_ok());
        }
        assert_eq!(records.len(), 1);

        if let Some(s) = m.status.as_mut() {
            s.done();
        }
    }
}
