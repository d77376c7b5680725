//! Constants used across the capacitance measurement engine.
//!
//! These values describe the fixed analog front end (a comparator tripping on a
//! bandgap reference while the part under test charges from the supply rail),
//! the capture timer's representable window, and the pacing of the report cycle.
//!
//! ## Key Concepts
//!
//! - **Overflow sentinel**: the raw capture value reserved for "the timer wrapped
//!   before the comparator tripped".
//! - **Time constant factor**: the number of RC time constants needed to cross the
//!   trip voltage, `ln(V_supply / V_trip)`.
//! - **Zero threshold**: the largest reading on the finest range that is still
//!   accepted as stray capacitance with nothing connected.

/// Raw capture value reserved for a timer overflow.
///
/// The capture timer is 16 bits wide, so a genuine capture can never report the
/// maximum count as a completed charge.
pub const OVERFLOW_SENTINEL: u16 = u16::MAX;

/// Supply rail the capacitor charges from, in volts.
pub const SUPPLY_VOLTS: f32 = 5.0;

/// Comparator trip voltage (internal bandgap reference), in volts.
pub const TRIP_VOLTS: f32 = 1.1;

/// `ln(5 / 1.1)`: RC time constants elapsed when the comparator trips.
pub const TIME_CONSTANT_FACTOR: f32 = 1.514128;

/// Readings on the finest range below this value latch the zero offset.
pub const ZERO_THRESHOLD_FARADS: f32 = 100e-12;

/// Reference (CPU/IO) clock feeding the capture timer prescaler, in Hz.
pub const REFERENCE_CLOCK_HZ: u32 = 16_000_000;

/// Range selected before the first cycle.
pub const DEFAULT_RANGE_INDEX: usize = 4;

/// Report cadence in milliseconds.
pub const REFRESH_PERIOD_MS: u32 = 500;

/// Prescaler used by the periodic refresh timer.
pub const REFRESH_PRESCALER: u32 = 256;

/// Capacity of a rendered report line, in bytes.
pub const REPORT_LINE_LEN: usize = 96;
