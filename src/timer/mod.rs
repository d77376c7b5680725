//! Timer helpers for the capture and refresh timers.
//!
//! The capture timer counts reference clock cycles through a prescaler selected per
//! range ([`ClockSelect`]); the refresh timer fires every [`REFRESH_PERIOD_MS`] to pace
//! reporting. Register programming belongs to the board support code, this module only
//! provides the numbers it needs.
//!
//! Contains:
//! - [`ClockSelect`]: prescaler selection with AVR-style `CS` codes
//! - `refresh_compare_value`: runtime compare-match calculator for the refresh timer
//! - `const_refresh_compare_value`: compile-time variant
//! - `capture_complete`, `capture_overflow`, `refresh_elapsed` and the declaration
//!   macros: interrupt-side entry points (feature `timer-isr`)
//! - `DelaySleep`: delay-driven waiting for the control loop (feature `delay-loop`)
//!
//! Common refresh timer settings at 16 MHz:
//!
//! | PRESCALER | COMPARE | Period |
//! |-----------|---------|--------|
//! |        64 |    2500 |  10 ms |
//! |       256 |   31250 | 500 ms |
//! |      1024 |   15625 |   1 s  |
//!
//! [`REFRESH_PERIOD_MS`]: crate::consts::REFRESH_PERIOD_MS

use libm::roundf;

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg_attr(feature = "delay-loop", allow(unused_imports))]
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use macros::*;

/// Milliseconds per second
pub const MILLISECONDS_PER_SECOND: u32 = 1_000;

/// Clock source for the capture timer.
///
/// The discriminants are the 3-bit clock-select codes used by 16-bit AVR timers, so
/// board code can write [`ClockSelect::code`] straight into its control register.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ClockSelect {
    /// No clock source, the counter is frozen.
    #[default]
    Stopped = 0b000,
    /// Reference clock, undivided
    Div1 = 0b001,
    /// Reference clock / 8
    Div8 = 0b010,
    /// Reference clock / 64
    Div64 = 0b011,
    /// Reference clock / 256
    Div256 = 0b100,
    /// Reference clock / 1024
    Div1024 = 0b101,
}

impl ClockSelect {
    /// Hardware clock-select code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Prescale factor applied to the reference clock, `0` when stopped.
    pub const fn divisor(self) -> u16 {
        match self {
            ClockSelect::Stopped => 0,
            ClockSelect::Div1 => 1,
            ClockSelect::Div8 => 8,
            ClockSelect::Div64 => 64,
            ClockSelect::Div256 => 256,
            ClockSelect::Div1024 => 1024,
        }
    }

    /// Looks up the clock source for a prescale factor.
    ///
    /// # Returns
    /// - `None` if the timer has no prescaler with that factor
    pub const fn from_divisor(divisor: u16) -> Option<Self> {
        match divisor {
            1 => Some(ClockSelect::Div1),
            8 => Some(ClockSelect::Div8),
            64 => Some(ClockSelect::Div64),
            256 => Some(ClockSelect::Div256),
            1024 => Some(ClockSelect::Div1024),
            _ => None,
        }
    }
}

/// Computes the compare-match value for the refresh timer (CTC mode).
///
/// # Arguments
/// - `f_cpu`: reference clock frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 64, 256, 1024)
/// - `period_ms`: desired refresh period in milliseconds
///
/// # Returns
/// - Compare value for OCRnA, rounded to the nearest count and saturated to 16 bits
pub fn refresh_compare_value(f_cpu: u32, prescaler: u32, period_ms: f32) -> u16 {
    let counts_per_second = f_cpu as f32 / prescaler as f32;
    let counts = roundf(counts_per_second * period_ms / MILLISECONDS_PER_SECOND as f32);
    if counts >= u16::MAX as f32 {
        u16::MAX
    } else {
        counts as u16
    }
}

/// Compile-time refresh compare value calculator
///
/// Integer-only variant of [`refresh_compare_value`]; truncates instead of rounding.
///
/// # Arguments
/// - `f_cpu`: reference clock frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 64, 256, 1024)
/// - `period_ms`: desired refresh period in milliseconds
pub const fn const_refresh_compare_value(f_cpu: u32, prescaler: u32, period_ms: u32) -> u16 {
    let counts = (f_cpu / prescaler) as u64 * period_ms as u64 / MILLISECONDS_PER_SECOND as u64;
    if counts >= u16::MAX as u64 {
        u16::MAX
    } else {
        counts as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{REFERENCE_CLOCK_HZ, REFRESH_PERIOD_MS, REFRESH_PRESCALER};

    #[test]
    fn test_refresh_compare_matches_half_second_at_16mhz() {
        assert_eq!(
            refresh_compare_value(REFERENCE_CLOCK_HZ, REFRESH_PRESCALER, REFRESH_PERIOD_MS as f32),
            31250
        );
        assert_eq!(
            const_refresh_compare_value(REFERENCE_CLOCK_HZ, REFRESH_PRESCALER, REFRESH_PERIOD_MS),
            31250
        );
    }

    #[test]
    fn test_refresh_compare_saturates() {
        assert_eq!(refresh_compare_value(16_000_000, 1, 500.0), u16::MAX);
        assert_eq!(const_refresh_compare_value(16_000_000, 1, 500), u16::MAX);
    }

    #[test]
    fn test_clock_select_codes_and_divisors() {
        assert_eq!(ClockSelect::Stopped.code(), 0);
        assert_eq!(ClockSelect::Div1024.code(), 0b101);
        assert_eq!(ClockSelect::Div64.divisor(), 64);
        assert_eq!(ClockSelect::from_divisor(256), Some(ClockSelect::Div256));
        assert_eq!(ClockSelect::from_divisor(32), None);
    }
}
