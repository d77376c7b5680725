/// Declares a static global `CAPMETER_EVENTS` channel.
///
/// This macro creates a `static` singleton `CAPMETER_EVENTS` that the capture,
/// overflow and refresh interrupt vectors write into and the control loop reads.
///
/// # Example
/// ```rust
/// capmeter::init_capmeter_events!();
///
/// fn main() {
///     assert!(!CAPMETER_EVENTS.refresh_pending());
/// }
/// ```
#[macro_export]
macro_rules! init_capmeter_events {
    () => {
        pub static CAPMETER_EVENTS: $crate::events::EventChannel =
            $crate::events::EventChannel::new();
    };
}

/// Deposits an input-capture count into the global `CAPMETER_EVENTS`.
///
/// Intended for the comparator input-capture vector.
///
/// # Example
/// ```rust,ignore
/// #[avr_device::interrupt(atmega2560)]
/// fn TIMER1_CAPT() {
///     capture_complete!(tc1.icr1.read().bits());
/// }
/// ```
///
/// # Notes
/// - This macro assumes `CAPMETER_EVENTS` was declared with `init_capmeter_events!`.
#[macro_export]
macro_rules! capture_complete {
    ( $captured:expr ) => {
        $crate::timer::capture_complete(&CAPMETER_EVENTS, $captured)
    };
}

/// Records a capture timer overflow in the global `CAPMETER_EVENTS`.
///
/// # Example
/// ```rust,ignore
/// #[avr_device::interrupt(atmega2560)]
/// fn TIMER1_OVF() {
///     capture_overflow!();
/// }
/// ```
///
/// # Notes
/// - This macro assumes `CAPMETER_EVENTS` was declared with `init_capmeter_events!`.
#[macro_export]
macro_rules! capture_overflow {
    () => {
        $crate::timer::capture_overflow(&CAPMETER_EVENTS)
    };
}

/// Raises the refresh flag in the global `CAPMETER_EVENTS`.
///
/// # Example
/// ```rust,ignore
/// #[avr_device::interrupt(atmega2560)]
/// fn TIMER3_COMPA() {
///     refresh_elapsed!();
/// }
/// ```
///
/// # Notes
/// - This macro assumes `CAPMETER_EVENTS` was declared with `init_capmeter_events!`.
#[macro_export]
macro_rules! refresh_elapsed {
    () => {
        $crate::timer::refresh_elapsed(&CAPMETER_EVENTS)
    };
}
