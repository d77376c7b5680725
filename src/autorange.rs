//! Autoranging.
//!
//! After every cycle the [`RangeSelector`] looks at the raw capture and decides which
//! range the next cycle uses. The default [`RangePolicy::Stepwise`] law moves at most
//! one step per cycle:
//!
//! - overflow: one step coarser, unless already at index 0
//! - ticks strictly below the active range's `min_ticks`: one step finer, unless
//!   already at the last index
//! - anything else: stay
//!
//! Convergence across a wide jump in capacitance takes several cycles. The opt-in
//! [`RangePolicy::Quick`] law jumps several steps at once using each range's growth
//! factor; it is known to misjudge some transitions and is never the default.

use crate::events::RawCapture;
use crate::range::RangeTable;

/// Autoranging law.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RangePolicy {
    /// Hysteretic one-step correction per cycle.
    #[default]
    Stepwise,
    /// Multi-step jump driven by `growth_factor`. Unreliable; opt in explicitly.
    Quick,
}

/// Picks the range for the next cycle.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub struct RangeSelector {
    policy: RangePolicy,
}

impl RangeSelector {
    /// Creates a selector using `policy`.
    pub const fn new(policy: RangePolicy) -> Self {
        Self { policy }
    }

    /// The law this selector applies.
    pub const fn policy(&self) -> RangePolicy {
        self.policy
    }

    /// Updates `index` in place from the cycle's raw capture.
    ///
    /// # Arguments
    /// - `table`: the range table `index` points into
    /// - `index`: active range index, `0 <= index < table.len()`
    /// - `raw`: the cycle's capture
    ///
    /// # Returns
    /// - `true` if the range changed
    pub fn select(&self, table: &RangeTable<'_>, index: &mut usize, raw: RawCapture) -> bool {
        let old = *index;
        let new = match self.policy {
            RangePolicy::Stepwise => step(table, old, raw),
            RangePolicy::Quick => quick(table, old, raw),
        };
        if new != old {
            debug!("rerange: {} -> {}", old, new);
            *index = new;
            true
        } else {
            false
        }
    }
}

fn step(table: &RangeTable<'_>, index: usize, raw: RawCapture) -> usize {
    match raw {
        RawCapture::Overflow => index.saturating_sub(1),
        RawCapture::Ticks(ticks) => {
            if ticks < table.range_at(index).min_ticks && index < table.finest_index() {
                index + 1
            } else {
                index
            }
        }
    }
}

fn quick(table: &RangeTable<'_>, index: usize, raw: RawCapture) -> usize {
    match raw {
        RawCapture::Overflow => {
            if index > 1 {
                1
            } else {
                index.saturating_sub(1)
            }
        }
        RawCapture::Ticks(ticks) => {
            let mut index = index;
            let mut scaled = ticks as u32;
            while index < table.finest_index() {
                let range = table.range_at(index);
                if scaled >= range.min_ticks as u32 {
                    break;
                }
                scaled = scaled.saturating_mul(range.growth_factor as u32);
                index += 1;
            }
            index
        }
    }
}
