//! Report records and their text rendering.
//!
//! The meter hands one [`Measurement`] per cycle to a [`Report`] sink. [`TextReport`]
//! renders it as a single line with metric-prefixed units, for example
//!
//! ```text
//! r_index=6 f=16.00MHz t=1.514ms timer=24226 R=10.00kΩ C=100.0nF
//! r_index=0 f=15.63kHz t=4.194 s timer=65535 R=270.0 Ω C>10.26mF
//! ```
//!
//! `C>` marks an overflow: the capacitance is larger than the printed lower bound.

use core::fmt::{self, Write};

use heapless::String;

use crate::consts::REPORT_LINE_LEN;
use crate::convert::{Capacitance, Measurement};

/// Metric prefixes, smallest first. `' '` is the unity prefix.
const PREFIXES: [char; 8] = ['p', 'n', 'u', 'm', ' ', 'k', 'M', 'G'];
const UNITY: usize = 4;

/// A value scaled by powers of 1000 into a metric prefix.
///
/// Scaling stops at the ends of the prefix table, so tiny values print in pico and
/// huge ones in giga with an oversized mantissa.
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct SiValue {
    /// Scaled mantissa
    pub mantissa: f32,
    /// Prefix character, `' '` for none
    pub prefix: char,
    /// Decimal places giving about four significant digits
    pub decimals: usize,
}

impl SiValue {
    /// Scales `x`.
    pub fn new(x: f32) -> Self {
        let mut x = x;
        let mut p = UNITY;
        while x < 1.0 && p > 0 {
            x *= 1e3;
            p -= 1;
        }
        while x >= 1e3 && p < PREFIXES.len() - 1 {
            x /= 1e3;
            p += 1;
        }
        let decimals = if x >= 1e3 {
            0
        } else if x >= 1e2 {
            1
        } else if x >= 1e1 {
            2
        } else {
            3
        };
        Self {
            mantissa: x,
            prefix: PREFIXES[p],
            decimals,
        }
    }
}

impl fmt::Display for SiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.*}{}", self.decimals, self.mantissa, self.prefix)
    }
}

/// Consumer of one record per completed cycle.
pub trait Report {
    /// Accepts a measurement.
    fn report(&mut self, measurement: &Measurement) -> fmt::Result;
}

impl<F> Report for F
where
    F: FnMut(&Measurement) -> fmt::Result,
{
    fn report(&mut self, measurement: &Measurement) -> fmt::Result {
        self(measurement)
    }
}

/// Writes the capacitance field: `C=<value>F`, or `C><value>F` on overflow.
fn write_capacitance<W: Write>(w: &mut W, capacitance: &Capacitance) -> fmt::Result {
    let op = if capacitance.is_overflow() { '>' } else { '=' };
    write!(w, "C{}{}F", op, SiValue::new(capacitance.farads()))
}

/// Writes one report line (without line terminator).
///
/// # Arguments
/// - `w`: destination
/// - `m`: the cycle's measurement
/// - `verbose`: include the range diagnostics before the capacitance
pub fn write_line<W: Write>(w: &mut W, m: &Measurement, verbose: bool) -> fmt::Result {
    if verbose {
        write!(
            w,
            "r_index={} f={}Hz t={}s timer={} R={}\u{3a9} ",
            m.range_index,
            SiValue::new(m.sample_frequency_hz),
            SiValue::new(m.elapsed_seconds),
            m.raw.to_register(),
            SiValue::new(m.resistance_ohms),
        )?;
    }
    write_capacitance(w, &m.capacitance)
}

/// Renders one verbose report line into a fixed buffer, e.g. for a UART writer
/// that takes bytes.
///
/// # Errors
/// - `fmt::Error` if the line does not fit in [`REPORT_LINE_LEN`] bytes
pub fn render_line(m: &Measurement) -> Result<String<REPORT_LINE_LEN>, fmt::Error> {
    let mut line = String::new();
    write_line(&mut line, m, true)?;
    Ok(line)
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_line(f, self, true)
    }
}

/// A [`Report`] sink that prints lines to any [`core::fmt::Write`].
///
/// A cycle that latches the zero offset is preceded by a `Zeroing to <C>F` line when
/// verbose.
#[derive(Debug)]
pub struct TextReport<W: Write> {
    writer: W,
    verbose: bool,
}

impl<W: Write> TextReport<W> {
    /// Wraps `writer`.
    ///
    /// # Arguments
    /// - `writer`: line destination, e.g. a serial port adapter
    /// - `verbose`: include range diagnostics and zeroing notices
    pub fn new(writer: W, verbose: bool) -> Self {
        Self { writer, verbose }
    }

    /// Borrow the writer.
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Releases the writer.
    pub fn release(self) -> W {
        self.writer
    }
}

impl<W: Write> Report for TextReport<W> {
    fn report(&mut self, m: &Measurement) -> fmt::Result {
        if self.verbose && m.zero_latched {
            write!(
                self.writer,
                "Zeroing to {}F\r\n",
                SiValue::new(m.zero_offset_farads)
            )?;
        }
        write_line(&mut self.writer, m, self.verbose)?;
        self.writer.write_str("\r\n")
    }
}
