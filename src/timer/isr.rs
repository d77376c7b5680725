use crate::events::EventChannel;

/// Used to initialize the global static [`EventChannel`] shared by the
/// interrupt vectors and the control loop.
///
/// # Returns
/// * A channel with every flag clear
///
/// # Example
/// ```rust
/// use capmeter::events::EventChannel;
/// use capmeter::timer::global_events_init;
///
/// static EVENTS: EventChannel = global_events_init();
/// ```
pub const fn global_events_init() -> EventChannel {
    EventChannel::new()
}

/// Body of the input-capture interrupt.
///
/// Stores the latched count and raises the capture flag, nothing else.
///
/// # Arguments
/// * The global static [`EventChannel`]
/// * The value of the input capture register
///
/// # Example
/// ```rust,ignore
/// #[avr_device::interrupt(atmega2560)]
/// fn TIMER1_CAPT() {
///     let tc1 = unsafe { &*pac::TC1::ptr() };
///     capture_complete(&EVENTS, tc1.icr1.read().bits());
/// }
/// ```
pub fn capture_complete(events: &'static EventChannel, captured: u16) {
    events.capture_complete(captured);
}

/// Body of the capture timer overflow interrupt.
///
/// # Arguments
/// * The global static [`EventChannel`]
///
/// # Example
/// ```rust,ignore
/// #[avr_device::interrupt(atmega2560)]
/// fn TIMER1_OVF() {
///     capture_overflow(&EVENTS);
/// }
/// ```
pub fn capture_overflow(events: &'static EventChannel) {
    events.capture_overflow();
}

/// Body of the refresh timer compare-match interrupt.
///
/// # Arguments
/// * The global static [`EventChannel`]
///
/// # Example
/// ```rust,ignore
/// #[avr_device::interrupt(atmega2560)]
/// fn TIMER3_COMPA() {
///     refresh_elapsed(&EVENTS);
/// }
/// ```
pub fn refresh_elapsed(events: &'static EventChannel) {
    events.refresh_elapsed();
}
