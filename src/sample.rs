use crate::expressions::{LineFormat, BANDWIDTH, END, START, THREAD, TIMESTAMP, UNITS};
use crate::timestamp::parse_iperf_timestamp;
use crate::units::Unit;
use crate::{Error, Result};
use chrono::NaiveDateTime;
use regex::Captures;
use serde::{Deserialize, Serialize};

/// The thread column of a report row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadId {
    /// A numbered per-thread row
    Stream(u32),
    /// The aggregate row (`[SUM]` or `-1`)
    Sum,
}

impl ThreadId {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "SUM" | "-1" => Some(ThreadId::Sum),
            other => other.parse().ok().map(ThreadId::Stream),
        }
    }
}

/// One parsed iperf report row.
///
/// `bandwidth` is the raw figure in `units`, before any conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub start: f64,
    pub end: f64,
    pub bandwidth: f64,
    pub units: Unit,
    pub thread: Option<ThreadId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
}

impl Sample {
    /// Builds a sample from the named groups of a matched expression.
    ///
    /// Rows without a units group (CSV) report bits per second.
    pub fn from_captures(format: LineFormat, caps: &Captures<'_>) -> Result<Self> {
        let start = number(caps, START)?;
        let end = number(caps, END)?;
        let bandwidth = number(caps, BANDWIDTH)?;
        let units = match caps.name(UNITS) {
            Some(units) => units.as_str().parse()?,
            None => Unit::Bits,
        };
        let thread = caps.name(THREAD).and_then(|t| ThreadId::parse(t.as_str()));
        let timestamp = match format {
            LineFormat::Csv => caps
                .name(TIMESTAMP)
                .and_then(|t| parse_iperf_timestamp(t.as_str())),
            LineFormat::Human => None,
        };

        Ok(Self {
            start,
            end,
            bandwidth,
            units,
            thread,
            timestamp,
        })
    }

    /// Width of the reporting interval in seconds.
    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

fn number(caps: &Captures<'_>, field: &'static str) -> Result<f64> {
    let text = caps.name(field).map(|m| m.as_str()).unwrap_or_default();
    text.parse().map_err(|_| Error::parse(field, text))
}
