//! # capmeter
//!
//! A portable, no_std Rust core for an autoranging capacitance meter that times an RC
//! charge with a hardware comparator and a timer's input-capture unit.
//!
//! The part under test charges through one of several reference resistors. When its
//! voltage crosses the comparator's bandgap reference, input capture latches the timer
//! count with no software latency; the count, the range's prescaler and the resistor
//! give the capacitance. This crate implements:
//! - the range table and one-step hysteretic autoranging (plus an opt-in quick policy)
//! - charge/discharge sequencing and capture timer arming behind small traits
//! - interrupt-safe event flags built on `critical-section`
//! - tick-to-farad conversion with one-time zero-offset calibration
//! - the control loop pacing one report per refresh tick
//!
//! Register programming (power reduction, pin directions, comparator and timer setup)
//! stays in board support code, which implements [`capture::ChargeNetwork`] and
//! [`capture::CaptureTimer`] and forwards its interrupt vectors to the [`timer`] helpers.
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support (host testing) |
//! | `timer-isr` (default) | Global `EventChannel` helpers and macros for interrupt vectors |
//! | `delay-loop`          | `DelaySleep`: waits with `embedded_hal::delay::DelayNs` instead of sleeping |
//! | `defmt-0-3`           | Uses `defmt` logging and `defmt::Format` derives |
//! | `log`                 | Uses `log` logging |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use capmeter::meter::{CapMeter, MeterConfig};
//! use capmeter::range::RangeTable;
//! use capmeter::report::TextReport;
//!
//! capmeter::init_capmeter_events!();
//!
//! #[avr_device::interrupt(atmega2560)]
//! fn TIMER1_CAPT() { capmeter::capture_complete!(icr1()); }
//! #[avr_device::interrupt(atmega2560)]
//! fn TIMER1_OVF() { capmeter::capture_overflow!(); }
//! #[avr_device::interrupt(atmega2560)]
//! fn TIMER3_COMPA() { capmeter::refresh_elapsed!(); }
//!
//! let mut meter = CapMeter::new(RangeTable::builtin(), network, tc1, Some(led), MeterConfig::default())?;
//! let mut report = TextReport::new(serial, true);
//! meter.run(&CAPMETER_EVENTS, &mut report, &mut || avr_device::asm::sleep());
//! ```
//!
//! ## Integration Notes
//!
//! - Interrupt handlers only deposit data and raise a flag; all computation happens in
//!   the control loop
//! - The capture timer must be stopped by [`capture::CaptureController::end_charge`]
//!   before it can fire again, which is what makes the single-slot flags sufficient
//! - Only one meter should own a given `EventChannel`
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub use critical_section;

pub use heapless;

#[macro_use]
mod fmt;

pub mod autorange;
pub mod capture;
pub mod consts;
pub mod convert;
pub mod error;
pub mod events;
pub mod meter;
pub mod range;
pub mod report;
pub mod timer;

pub use error::Error;
