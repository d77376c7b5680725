//! Interrupt-to-main-loop event channel.
//!
//! Interrupt handlers deposit exactly one piece of data and raise exactly one flag;
//! the control loop takes the flag and its data together and clears it. Each event
//! kind is a capacity-1 mailbox: a second event before the first is consumed
//! overwrites it, which the hardware sequencing rules out (the capture timer is
//! disarmed before it could fire twice).
//!
//! Both sides run inside [`critical_section::with`], so the producer's
//! "payload, then flag" write and the consumer's "flag, payload, clear" read are
//! each indivisible. The consumer can never see a raised flag next to a stale
//! payload.

use core::cell::Cell;
use critical_section::Mutex;

use crate::consts::OVERFLOW_SENTINEL;

/// Unconverted outcome of one charge cycle.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RawCapture {
    /// The comparator tripped after this many timer ticks (`0..=65534`).
    Ticks(u16),
    /// The timer wrapped before the comparator tripped.
    Overflow,
}

impl RawCapture {
    /// Interprets a raw 16-bit capture register value.
    ///
    /// [`OVERFLOW_SENTINEL`] is reserved and maps to [`RawCapture::Overflow`].
    pub const fn from_register(value: u16) -> Self {
        if value == OVERFLOW_SENTINEL {
            RawCapture::Overflow
        } else {
            RawCapture::Ticks(value)
        }
    }

    /// Register encoding, with overflow as [`OVERFLOW_SENTINEL`].
    pub const fn to_register(self) -> u16 {
        match self {
            RawCapture::Ticks(t) => t,
            RawCapture::Overflow => OVERFLOW_SENTINEL,
        }
    }

    /// Whether this is the overflow outcome.
    pub const fn is_overflow(self) -> bool {
        matches!(self, RawCapture::Overflow)
    }
}

/// Flags and payloads shared between interrupt handlers and the control loop.
///
/// Declare one as a `static` and hand `&'static` references to the interrupt
/// vectors and the loop.
///
/// # Example
/// ```rust
/// use capmeter::events::{EventChannel, RawCapture};
///
/// static EVENTS: EventChannel = EventChannel::new();
///
/// // TIMER1_CAPT
/// EVENTS.capture_complete(1234);
/// // control loop
/// assert_eq!(EVENTS.take_capture(), Some(RawCapture::Ticks(1234)));
/// assert_eq!(EVENTS.take_capture(), None);
/// ```
#[derive(Debug)]
pub struct EventChannel {
    capture: Mutex<Cell<Option<RawCapture>>>,
    refresh: Mutex<Cell<bool>>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    /// Creates a channel with both flags clear.
    pub const fn new() -> Self {
        Self {
            capture: Mutex::new(Cell::new(None)),
            refresh: Mutex::new(Cell::new(false)),
        }
    }

    /// Producer for the comparator-triggered input capture edge.
    ///
    /// # Arguments
    /// - `captured`: the timer count latched by input capture
    pub fn capture_complete(&self, captured: u16) {
        critical_section::with(|cs| {
            self.capture
                .borrow(cs)
                .set(Some(RawCapture::from_register(captured)));
        });
    }

    /// Producer for capture timer overflow: the charge outlasted the timer window.
    pub fn capture_overflow(&self) {
        critical_section::with(|cs| {
            self.capture.borrow(cs).set(Some(RawCapture::Overflow));
        });
    }

    /// Producer for the periodic refresh timer.
    pub fn refresh_elapsed(&self) {
        critical_section::with(|cs| {
            self.refresh.borrow(cs).set(true);
        });
    }

    /// Consumes the pending capture, if any.
    ///
    /// The returned value is the only copy; the slot reads as empty afterwards.
    pub fn take_capture(&self) -> Option<RawCapture> {
        critical_section::with(|cs| self.capture.borrow(cs).take())
    }

    /// Consumes the refresh flag, returning whether it was raised.
    pub fn take_refresh(&self) -> bool {
        critical_section::with(|cs| self.refresh.borrow(cs).replace(false))
    }

    /// Whether a capture is waiting, without consuming it.
    pub fn capture_pending(&self) -> bool {
        critical_section::with(|cs| self.capture.borrow(cs).get().is_some())
    }

    /// Whether the refresh flag is raised, without consuming it.
    pub fn refresh_pending(&self) -> bool {
        critical_section::with(|cs| self.refresh.borrow(cs).get())
    }
}
