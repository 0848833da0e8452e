//! Bandwidth units and conversion between them.
//!
//! Bit units use decimal prefixes (1 Kbit = 1000 bits) and byte units use
//! binary prefixes (1 KByte = 1024 bytes), the same convention iperf uses when
//! it formats its own reports.

use crate::{Error, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const UNIT_COUNT: usize = 10;

/// A bandwidth unit as printed by iperf (the `/sec` suffix is implied).
///
/// # Examples
///
/// ```
/// use iperf_parse::units::Unit;
///
/// let unit: Unit = "Mbits/sec".parse().unwrap();
/// assert_eq!(unit, Unit::Mbits);
/// assert_eq!(unit.to_string(), "Mbits");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "bits")]
    Bits,
    Kbits,
    Mbits,
    Gbits,
    Tbits,
    Bytes,
    KBytes,
    MBytes,
    GBytes,
    TBytes,
}

impl Unit {
    /// Every unit, in table order.
    pub const ALL: [Unit; UNIT_COUNT] = [
        Unit::Bits,
        Unit::Kbits,
        Unit::Mbits,
        Unit::Gbits,
        Unit::Tbits,
        Unit::Bytes,
        Unit::KBytes,
        Unit::MBytes,
        Unit::GBytes,
        Unit::TBytes,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Number of bits in one of this unit.
    pub fn bits(self) -> f64 {
        const KILO: f64 = 1_000.0;
        const KIBI: f64 = 1_024.0;
        match self {
            Unit::Bits => 1.0,
            Unit::Kbits => KILO,
            Unit::Mbits => KILO * KILO,
            Unit::Gbits => KILO * KILO * KILO,
            Unit::Tbits => KILO * KILO * KILO * KILO,
            Unit::Bytes => 8.0,
            Unit::KBytes => 8.0 * KIBI,
            Unit::MBytes => 8.0 * KIBI * KIBI,
            Unit::GBytes => 8.0 * KIBI * KIBI * KIBI,
            Unit::TBytes => 8.0 * KIBI * KIBI * KIBI * KIBI,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Bits => "bits",
            Unit::Kbits => "Kbits",
            Unit::Mbits => "Mbits",
            Unit::Gbits => "Gbits",
            Unit::Tbits => "Tbits",
            Unit::Bytes => "Bytes",
            Unit::KBytes => "KBytes",
            Unit::MBytes => "MBytes",
            Unit::GBytes => "GBytes",
            Unit::TBytes => "TBytes",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let name = trimmed
            .strip_suffix("/sec")
            .or_else(|| trimmed.strip_suffix("/s"))
            .unwrap_or(trimmed);

        if let Some(unit) = Unit::ALL.iter().find(|u| u.as_str() == name) {
            return Ok(*unit);
        }

        let lower = name.to_ascii_lowercase();
        let (prefix, bytes) = if let Some(prefix) = lower.strip_suffix("bits") {
            (prefix, false)
        } else if let Some(prefix) = lower.strip_suffix("bytes") {
            (prefix, true)
        } else {
            return Err(Error::Units(format!("unknown unit {s:?}")));
        };

        let unit = match (prefix, bytes) {
            ("", false) => Unit::Bits,
            ("k", false) => Unit::Kbits,
            ("m", false) => Unit::Mbits,
            ("g", false) => Unit::Gbits,
            ("t", false) => Unit::Tbits,
            ("", true) => Unit::Bytes,
            ("k", true) => Unit::KBytes,
            ("m", true) => Unit::MBytes,
            ("g", true) => Unit::GBytes,
            ("t", true) => Unit::TBytes,
            _ => return Err(Error::Units(format!("unknown unit prefix in {s:?}"))),
        };
        Ok(unit)
    }
}

/// Table-driven converter with a ceiling on converted values.
///
/// Converted values above the ceiling are treated as corrupt samples and
/// reported as `0.0`.
///
/// # Examples
///
/// ```
/// use iperf_parse::units::{Unit, UnitConverter};
///
/// let converter = UnitConverter::with_maximum(1e9);
/// assert_eq!(converter.convert(94.5, Unit::Mbits, Unit::Mbits), 94.5);
/// assert_eq!(converter.convert(2e9, Unit::Mbits, Unit::Mbits), 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct UnitConverter {
    table: [[f64; UNIT_COUNT]; UNIT_COUNT],
    maximum: f64,
}

impl UnitConverter {
    /// Creates a converter without a ceiling.
    pub fn new() -> Self {
        Self::with_maximum(f64::INFINITY)
    }

    /// Creates a converter that zeroes any converted value above `maximum`.
    pub fn with_maximum(maximum: f64) -> Self {
        let mut table = [[1.0; UNIT_COUNT]; UNIT_COUNT];
        for from in Unit::ALL {
            for to in Unit::ALL {
                if from != to {
                    table[from.index()][to.index()] = from.bits() / to.bits();
                }
            }
        }
        Self { table, maximum }
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// Multiplier taking a value in `from` to a value in `to`.
    pub fn factor(&self, from: Unit, to: Unit) -> f64 {
        self.table[from.index()][to.index()]
    }

    pub fn convert(&self, value: f64, from: Unit, to: Unit) -> f64 {
        let converted = value * self.factor(from, to);
        if converted > self.maximum {
            warn!(
                "{} {} exceeds the {} {} ceiling, using 0.0",
                converted, to, self.maximum, to
            );
            return 0.0;
        }
        converted
    }

    /// Same as [`convert`](Self::convert) but with unit names as printed by iperf.
    pub fn convert_str(&self, value: f64, from: &str, to: &str) -> Result<f64> {
        Ok(self.convert(value, from.parse()?, to.parse()?))
    }
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self::new()
    }
}
