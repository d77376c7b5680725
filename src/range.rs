//! Measurement ranges.
//!
//! A [`Range`] pairs a reference resistor with a capture timer prescaler. The
//! built-in [`RANGES`] table is ordered from the coarsest timebase (smallest
//! resistor, slowest clock) to the finest (largest resistor, undivided clock);
//! the [`RangeSelector`](crate::autorange::RangeSelector) walks it one step at a time.
//!
//! ## Table
//!
//! | Index | R      | Prescale | Network | min ticks | grow |
//! |-------|--------|----------|---------|-----------|------|
//! |     0 | 270 Ω  |     1024 | R0      |     16384 |    4 |
//! |     1 | 270 Ω  |      256 | R0      |     16384 |    4 |
//! |     2 | 270 Ω  |       64 | R0      |      8192 |    8 |
//! |     3 | 270 Ω  |        8 | R0      |      8192 |    8 |
//! |     4 | 270 Ω  |        1 | R0      |     14156 |    5 |
//! |     5 | 10 kΩ  |        8 | R1      |      8192 |    8 |
//! |     6 | 10 kΩ  |        1 | R1      |      5243 |   13 |
//! |     7 | 1 MΩ   |        8 | R2      |      8192 |    8 |
//! |     8 | 1 MΩ   |        1 | R2      |         0 |  255 |
//!
//! `min` is roughly `2^16 / grow`, where `grow` is the ratio of effective timescales
//! between a range and the next finer one.

use crate::error::Error;
use crate::timer::ClockSelect;

/// Selects which charge resistors sink current while a range is active.
///
/// Bit `n` set means resistor path `n` is driven; clear paths float. The discharge
/// configuration drives every path in [`NetworkMask::ALL`].
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct NetworkMask(pub u8);

impl NetworkMask {
    /// 270 Ω path
    pub const R0: NetworkMask = NetworkMask(0b001);
    /// 10 kΩ path
    pub const R1: NetworkMask = NetworkMask(0b010);
    /// 1 MΩ path
    pub const R2: NetworkMask = NetworkMask(0b100);
    /// Every resistor path, used to discharge
    pub const ALL: NetworkMask = NetworkMask(0b111);

    /// Raw bit pattern.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether resistor path `path` is driven under this mask.
    pub const fn drives(self, path: u8) -> bool {
        path < 8 && self.0 & (1 << path) != 0
    }
}

/// One resistor/timebase configuration.
#[derive(PartialEq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Range {
    /// Reference resistor in ohms.
    pub resistance: f32,
    /// Capture timer clock source; its divisor is the range's prescale factor.
    pub clock: ClockSelect,
    /// Charge paths enabled while this range is measuring.
    pub network: NetworkMask,
    /// Tick count below which resolution is too coarse and the next finer range
    /// should be tried.
    pub min_ticks: u16,
    /// Ratio of effective timescales to the next finer range. Only consulted by
    /// [`RangePolicy::Quick`](crate::autorange::RangePolicy::Quick).
    pub growth_factor: u8,
}

impl Range {
    /// Builds a range entry.
    pub const fn new(
        resistance: f32,
        clock: ClockSelect,
        network: NetworkMask,
        min_ticks: u16,
        growth_factor: u8,
    ) -> Self {
        Self {
            resistance,
            clock,
            network,
            min_ticks,
            growth_factor,
        }
    }

    /// Prescale factor applied to the reference clock.
    pub const fn clock_divisor(&self) -> u16 {
        self.clock.divisor()
    }

    /// Hardware clock-select code for this range.
    pub const fn clock_select_code(&self) -> u8 {
        self.clock.code()
    }

    /// Capture timer tick rate for a given reference clock, in Hz.
    pub fn tick_frequency(&self, reference_clock_hz: u32) -> f32 {
        reference_clock_hz as f32 / self.clock_divisor() as f32
    }
}

/// The built-in range table, coarsest first.
pub static RANGES: [Range; 9] = [
    Range::new(270.0, ClockSelect::Div1024, NetworkMask::R0, 16384, 4),
    Range::new(270.0, ClockSelect::Div256, NetworkMask::R0, 16384, 4),
    Range::new(270.0, ClockSelect::Div64, NetworkMask::R0, 8192, 8),
    Range::new(270.0, ClockSelect::Div8, NetworkMask::R0, 8192, 8),
    Range::new(270.0, ClockSelect::Div1, NetworkMask::R0, 14156, 5),
    Range::new(10e3, ClockSelect::Div8, NetworkMask::R1, 8192, 8),
    Range::new(10e3, ClockSelect::Div1, NetworkMask::R1, 5243, 13),
    Range::new(1e6, ClockSelect::Div8, NetworkMask::R2, 8192, 8),
    Range::new(1e6, ClockSelect::Div1, NetworkMask::R2, 0, 0xFF),
];

/// Read-only view over an ordered range table.
///
/// Built once at startup and shared by reference; it never reallocates.
#[derive(Clone, Copy, Debug)]
pub struct RangeTable<'a> {
    ranges: &'a [Range],
}

impl RangeTable<'static> {
    /// The built-in [`RANGES`] table.
    pub const fn builtin() -> Self {
        Self { ranges: &RANGES }
    }
}

impl Default for RangeTable<'static> {
    fn default() -> Self {
        Self::builtin()
    }
}

impl<'a> RangeTable<'a> {
    /// Wraps a custom table, ordered coarsest first.
    ///
    /// # Errors
    /// - [`Error::EmptyTable`] when `ranges` has no entries
    pub fn new<E: core::fmt::Debug>(ranges: &'a [Range]) -> Result<Self, Error<E>> {
        if ranges.is_empty() {
            return Err(Error::EmptyTable);
        }
        Ok(Self { ranges })
    }

    /// Range at `index`.
    ///
    /// # Panics
    /// If `index >= self.len()`. The selector never produces such an index.
    pub fn range_at(&self, index: usize) -> &'a Range {
        &self.ranges[index]
    }

    /// Range at `index`, or `None` when outside the table.
    pub fn get(&self, index: usize) -> Option<&'a Range> {
        self.ranges.get(index)
    }

    /// Number of ranges.
    pub const fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Always `false` for tables built through [`RangeTable::new`] or [`RangeTable::builtin`].
    pub const fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Index of the finest range (the zero-calibration range).
    pub const fn finest_index(&self) -> usize {
        self.ranges.len().saturating_sub(1)
    }

    /// Iterates over the ranges, coarsest first.
    pub fn iter(&self) -> core::slice::Iter<'a, Range> {
        self.ranges.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_shape() {
        let table = RangeTable::builtin();
        assert_eq!(table.len(), 9);
        assert_eq!(table.finest_index(), 8);

        let r4 = table.range_at(4);
        assert_eq!(r4.resistance, 270.0);
        assert_eq!(r4.clock_divisor(), 1);
        assert_eq!(r4.min_ticks, 14156);

        let r8 = table.range_at(8);
        assert_eq!(r8.resistance, 1e6);
        assert_eq!(r8.clock_select_code(), 0b001);
        assert_eq!(r8.network, NetworkMask::R2);
    }

    #[test]
    fn test_range_at_is_total_over_the_table() {
        let table = RangeTable::builtin();
        for i in 0..table.len() {
            assert_eq!(table.get(i), Some(table.range_at(i)));
        }
        assert!(table.get(table.len()).is_none());
    }

    #[test]
    fn test_ranges_ordered_coarse_to_fine() {
        // Effective timescale (R * tick rate) never shrinks toward the fine end.
        let table = RangeTable::builtin();
        let scale = |r: &Range| r.resistance * r.tick_frequency(16_000_000);
        for pair in RANGES.windows(2) {
            assert!(scale(&pair[0]) < scale(&pair[1]));
        }
        assert!(table.iter().all(|r| r.clock != ClockSelect::Stopped));
    }

    #[test]
    fn test_empty_custom_table_rejected() {
        let err = RangeTable::new::<()>(&[]).unwrap_err();
        assert_eq!(err, Error::EmptyTable);
        let ok = RangeTable::new::<()>(&RANGES[..2]).unwrap();
        assert_eq!(ok.finest_index(), 1);
    }

    #[test]
    fn test_network_mask_paths() {
        assert!(NetworkMask::R1.drives(1));
        assert!(!NetworkMask::R1.drives(0));
        assert!(NetworkMask::ALL.drives(2));
        assert!(!NetworkMask::ALL.drives(9));
        assert_eq!(NetworkMask::R2.bits(), 4);
    }
}
