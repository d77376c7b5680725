//! Error type shared by the meter and its configuration.
//!
//! Measurement anomalies (overflow, range saturation, calibration underflow) are
//! ordinary data and never show up here. Only collaborator failures and rejected
//! configuration do.

use thiserror::Error;

/// Errors surfaced by [`CapMeter`](crate::meter::CapMeter) and
/// [`MeterConfig`](crate::meter::MeterConfig).
///
/// `E` is the error type of the status indicator pin.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Error<E: core::fmt::Debug> {
    /// Driving the status indicator pin failed.
    #[error("status pin error: {0:?}")]
    Pin(E),
    /// The reporting sink could not accept the record.
    #[error("report sink rejected the record")]
    Report,
    /// The configured start range does not exist in the table.
    #[error("range index {index} out of bounds for a table of {len} ranges")]
    InvalidRange {
        /// Requested index
        index: usize,
        /// Number of ranges in the table
        len: usize,
    },
    /// A range table with no entries was supplied.
    #[error("range table is empty")]
    EmptyTable,
    /// The trip voltage is not a positive fraction of the supply, so charge time
    /// cannot be converted to capacitance.
    #[error("trip voltage must be positive and below the supply")]
    InvalidVoltages,
}

impl<E: core::fmt::Debug> From<core::fmt::Error> for Error<E> {
    fn from(_: core::fmt::Error) -> Self {
        Error::Report
    }
}
