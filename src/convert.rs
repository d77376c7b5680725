//! Tick count to capacitance conversion.
//!
//! The part under test charges through the range's reference resistor `R` from the
//! supply rail until the comparator trips at the bandgap voltage. For an RC charge
//! that takes `t = R * C * ln(V_supply / V_trip)`, so
//!
//! ```text
//! f = f_ref / prescale
//! t = ticks / f
//! C = t / (ln(V_supply / V_trip) * R)
//! ```
//!
//! With nothing connected the finest range still sees the stray capacitance of the
//! wiring and comparator input. The first sufficiently small reading on that range is
//! latched as the zero offset and subtracted from every later reading, clamping at 0.

use libm::logf;

use crate::consts::{
    OVERFLOW_SENTINEL, REFERENCE_CLOCK_HZ, SUPPLY_VOLTS, TRIP_VOLTS, ZERO_THRESHOLD_FARADS,
};
use crate::events::RawCapture;
use crate::range::RangeTable;

/// Zero-offset calibration state.
///
/// Starts unzeroed and latches at most once; the offset never changes afterwards.
#[derive(PartialEq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Calibration {
    zero_offset: Option<f32>,
}

impl Calibration {
    /// Uncalibrated state.
    pub const fn new() -> Self {
        Self { zero_offset: None }
    }

    /// Whether the zero offset has been latched.
    pub const fn is_zeroed(&self) -> bool {
        self.zero_offset.is_some()
    }

    /// Latched stray capacitance in farads, `0.0` before zeroing.
    pub fn zero_offset_farads(&self) -> f32 {
        self.zero_offset.unwrap_or(0.0)
    }

    /// Latches `farads` as the zero offset unless one is already set.
    ///
    /// # Returns
    /// - `true` if this call latched the offset
    pub fn latch(&mut self, farads: f32) -> bool {
        if self.zero_offset.is_some() {
            return false;
        }
        self.zero_offset = Some(farads);
        true
    }

    /// Subtracts the zero offset (if any), clamping at 0.
    pub fn apply(&self, farads: f32) -> f32 {
        match self.zero_offset {
            Some(offset) => (farads - offset).max(0.0),
            None => farads,
        }
    }
}

/// Reported capacitance for one cycle.
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Capacitance {
    /// Converted, zero-corrected value in farads (never negative).
    Farads(f32),
    /// The timer overflowed. The value is what a full timer window would have
    /// measured: the true capacitance is larger.
    Overflow {
        /// Uncorrected capacitance of a full timer window, in farads
        at_least: f32,
    },
}

impl Capacitance {
    /// Whether the cycle overflowed.
    pub const fn is_overflow(&self) -> bool {
        matches!(self, Capacitance::Overflow { .. })
    }

    /// The number carried by either variant, in farads.
    pub const fn farads(&self) -> f32 {
        match *self {
            Capacitance::Farads(c) => c,
            Capacitance::Overflow { at_least } => at_least,
        }
    }
}

/// One cycle's result plus the diagnostics a report line shows.
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Measurement {
    /// Range the cycle was measured on
    pub range_index: usize,
    /// Capture timer tick rate, in Hz
    pub sample_frequency_hz: f32,
    /// Charge time represented by the raw count, in seconds
    pub elapsed_seconds: f32,
    /// Reference resistor, in ohms
    pub resistance_ohms: f32,
    /// Raw capture
    pub raw: RawCapture,
    /// Reported capacitance
    pub capacitance: Capacitance,
    /// Set on the one cycle that latched the zero offset
    pub zero_latched: bool,
    /// Zero offset in effect after this cycle, in farads
    pub zero_offset_farads: f32,
}

impl Measurement {
    /// Whether the cycle overflowed.
    pub const fn is_overflow(&self) -> bool {
        self.raw.is_overflow()
    }
}

/// Converts raw captures to capacitance.
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct Converter {
    reference_clock_hz: u32,
    time_constant_factor: f32,
    zero_threshold_farads: f32,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(
            REFERENCE_CLOCK_HZ,
            Self::default_time_constant_factor(),
            ZERO_THRESHOLD_FARADS,
        )
    }
}

impl Converter {
    /// Creates a converter.
    ///
    /// # Arguments
    /// - `reference_clock_hz`: clock feeding the capture timer prescaler
    /// - `time_constant_factor`: RC time constants until the comparator trips,
    ///   see [`Converter::time_constant_factor_for`]
    /// - `zero_threshold_farads`: largest finest-range reading accepted as stray
    ///   capacitance
    pub const fn new(
        reference_clock_hz: u32,
        time_constant_factor: f32,
        zero_threshold_farads: f32,
    ) -> Self {
        Self {
            reference_clock_hz,
            time_constant_factor,
            zero_threshold_farads,
        }
    }

    /// `ln(supply / trip)`: RC time constants for an exponential charge between the
    /// two voltages.
    ///
    /// `time_constant_factor_for(5.0, 1.1)` is about `1.514128`.
    pub fn time_constant_factor_for(supply_volts: f32, trip_volts: f32) -> f32 {
        logf(supply_volts / trip_volts)
    }

    /// Default front end: [`SUPPLY_VOLTS`] charging toward [`TRIP_VOLTS`].
    pub fn default_time_constant_factor() -> f32 {
        Self::time_constant_factor_for(SUPPLY_VOLTS, TRIP_VOLTS)
    }

    /// Time constant factor in use.
    pub const fn time_constant_factor(&self) -> f32 {
        self.time_constant_factor
    }

    /// Reference clock in Hz.
    pub const fn reference_clock_hz(&self) -> u32 {
        self.reference_clock_hz
    }

    /// Uncorrected capacitance for `ticks` on range `index`, in farads.
    pub fn raw_farads(&self, table: &RangeTable<'_>, index: usize, ticks: u16) -> f32 {
        let range = table.range_at(index);
        let elapsed = ticks as f32 / range.tick_frequency(self.reference_clock_hz);
        elapsed / self.time_constant_factor / range.resistance
    }

    /// Applies the zeroing rule to an uncorrected value measured on range `index`.
    ///
    /// Negative inputs are clamped to 0 first, so neither the result nor a latched
    /// offset can go below zero.
    ///
    /// # Returns
    /// - the corrected capacitance
    /// - whether this call latched the zero offset
    pub fn calibrate(
        &self,
        table: &RangeTable<'_>,
        index: usize,
        raw_farads: f32,
        calibration: &mut Calibration,
    ) -> (f32, bool) {
        let raw_farads = raw_farads.max(0.0);
        let latched = !calibration.is_zeroed()
            && index == table.finest_index()
            && raw_farads < self.zero_threshold_farads
            && calibration.latch(raw_farads);
        if latched {
            info!("zeroing to {} F", raw_farads);
        }
        (calibration.apply(raw_farads), latched)
    }

    /// Converts one cycle's raw capture measured on range `index`.
    ///
    /// Overflows skip calibration entirely.
    pub fn convert(
        &self,
        table: &RangeTable<'_>,
        index: usize,
        raw: RawCapture,
        calibration: &mut Calibration,
    ) -> Measurement {
        let range = table.range_at(index);
        let sample_frequency_hz = range.tick_frequency(self.reference_clock_hz);
        let ticks = raw.to_register();
        let elapsed_seconds = ticks as f32 / sample_frequency_hz;

        let (capacitance, zero_latched) = match raw {
            RawCapture::Overflow => {
                debug!("overflow on range {}", index);
                let at_least = self.raw_farads(table, index, OVERFLOW_SENTINEL).max(0.0);
                (Capacitance::Overflow { at_least }, false)
            }
            RawCapture::Ticks(t) => {
                let raw_farads = self.raw_farads(table, index, t);
                let (farads, latched) = self.calibrate(table, index, raw_farads, calibration);
                (Capacitance::Farads(farads), latched)
            }
        };

        Measurement {
            range_index: index,
            sample_frequency_hz,
            elapsed_seconds,
            resistance_ohms: range.resistance,
            raw,
            capacitance,
            zero_latched,
            zero_offset_farads: calibration.zero_offset_farads(),
        }
    }
}
