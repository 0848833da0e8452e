//! Regular expressions for the two iperf report layouts.
//!
//! Human-readable (iperf2 and iperf3):
//!
//! ```text
//! [  3]  0.0- 1.0 sec   112 MBytes   941 Mbits/sec
//! [SUM]  0.0- 1.0 sec   448 MBytes  3.76 Gbits/sec
//! ```
//!
//! CSV (iperf2 `-y c`), bandwidth in bits per second:
//!
//! ```text
//! 20120518130523,192.168.20.1,5001,192.168.20.57,43170,3,0.0-1.0,117833728,942669824
//! 20120518130523,192.168.20.1,5001,192.168.20.57,0,-1,0.0-1.0,471334912,3770679296
//! ```

use crate::Result;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const START: &str = "start";
pub const END: &str = "end";
pub const BANDWIDTH: &str = "bandwidth";
pub const UNITS: &str = "units";
pub const THREAD: &str = "thread";
pub const TIMESTAMP: &str = "timestamp";

const NUMBER: &str = r"[\d.]+";
const HUMAN_INTERVAL: &str = r"\s*(?P<start>[\d.]+)\s*-\s*(?P<end>[\d.]+)\s+sec";
const HUMAN_TRANSFER: &str = r"\s+[\d.]+\s+[KMGTkmgt]?(?:Bytes|bytes|bits)";
const HUMAN_BANDWIDTH: &str = r"\s+(?P<bandwidth>[\d.]+)\s+(?P<units>[KMGTkmgt]?(?:bits|Bytes|bytes))/sec";

/// The two report layouts iperf can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineFormat {
    Human,
    Csv,
}

impl fmt::Display for LineFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineFormat::Human => f.write_str("human"),
            LineFormat::Csv => f.write_str("csv"),
        }
    }
}

/// Which rows of the thread column an expression accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadColumn {
    /// Numbered per-thread rows only
    PerThread,
    /// The aggregate row: `[SUM]` or thread id `-1`
    Aggregate,
}

impl ThreadColumn {
    /// The column holding the interval total for a run with `threads` threads.
    ///
    /// A single-thread run never prints an aggregate row, so its only row is
    /// the total.
    pub fn sum_for(threads: usize) -> Self {
        if threads > 1 {
            ThreadColumn::Aggregate
        } else {
            ThreadColumn::PerThread
        }
    }
}

/// A compiled expression for one layout and thread column.
#[derive(Debug, Clone)]
pub struct Expression {
    format: LineFormat,
    column: ThreadColumn,
    regex: Regex,
}

impl Expression {
    pub fn new(format: LineFormat, column: ThreadColumn) -> Result<Self> {
        let pattern = match format {
            LineFormat::Human => human_pattern(column),
            LineFormat::Csv => csv_pattern(column),
        };
        Ok(Self {
            format,
            column,
            regex: Regex::new(&pattern)?,
        })
    }

    pub fn human(column: ThreadColumn) -> Result<Self> {
        Self::new(LineFormat::Human, column)
    }

    pub fn csv(column: ThreadColumn) -> Result<Self> {
        Self::new(LineFormat::Csv, column)
    }

    pub fn format(&self) -> LineFormat {
        self.format
    }

    pub fn column(&self) -> ThreadColumn {
        self.column
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn captures<'h>(&self, line: &'h str) -> Option<Captures<'h>> {
        self.regex.captures(line)
    }
}

fn human_pattern(column: ThreadColumn) -> String {
    let thread = match column {
        ThreadColumn::PerThread => r"\[\s*(?P<thread>\d+)\]",
        ThreadColumn::Aggregate => r"\[(?P<thread>SUM)\]",
    };
    format!("{thread}{HUMAN_INTERVAL}{HUMAN_TRANSFER}{HUMAN_BANDWIDTH}")
}

fn csv_pattern(column: ThreadColumn) -> String {
    let thread = match column {
        ThreadColumn::PerThread => r"(?P<thread>\d+)",
        ThreadColumn::Aggregate => r"(?P<thread>-1)",
    };
    format!(
        r"(?P<timestamp>\d{{14}}(?:\.\d+)?),[^,]*,\d+,[^,]*,\d+,{thread},(?P<start>{NUMBER})-(?P<end>{NUMBER}),\d+,(?P<bandwidth>{NUMBER})"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUMAN_THREAD: &str = "[  3]  0.0- 1.0 sec   112 MBytes   941 Mbits/sec";
    const HUMAN_SUM: &str = "[SUM]  0.0- 1.0 sec   448 MBytes  3.76 Gbits/sec";
    const IPERF3_THREAD: &str =
        "[  5]   1.00-2.00   sec   112 MBytes   940 Mbits/sec    0    396 KBytes";
    const CSV_THREAD: &str =
        "20120518130523,192.168.20.1,5001,192.168.20.57,43170,3,0.0-1.0,117833728,942669824";
    const CSV_SUM: &str =
        "20120518130523,192.168.20.1,5001,192.168.20.57,0,-1,0.0-1.0,471334912,3770679296";

    #[test]
    fn test_human_per_thread_fields() {
        let expression = Expression::human(ThreadColumn::PerThread).unwrap();
        let caps = expression.captures(HUMAN_THREAD).unwrap();
        assert_eq!(&caps[THREAD], "3");
        assert_eq!(&caps[START], "0.0");
        assert_eq!(&caps[END], "1.0");
        assert_eq!(&caps[BANDWIDTH], "941");
        assert_eq!(&caps[UNITS], "Mbits");
    }

    #[test]
    fn test_human_matches_iperf3_rows() {
        let expression = Expression::human(ThreadColumn::PerThread).unwrap();
        let caps = expression.captures(IPERF3_THREAD).unwrap();
        assert_eq!(&caps[START], "1.00");
        assert_eq!(&caps[END], "2.00");
        assert_eq!(&caps[BANDWIDTH], "940");
    }

    #[test]
    fn test_per_thread_skips_sum_rows() {
        let human = Expression::human(ThreadColumn::PerThread).unwrap();
        assert!(human.captures(HUMAN_SUM).is_none());
        let csv = Expression::csv(ThreadColumn::PerThread).unwrap();
        assert!(csv.captures(CSV_SUM).is_none());
    }

    #[test]
    fn test_aggregate_matches_only_sum_rows() {
        let human = Expression::human(ThreadColumn::Aggregate).unwrap();
        assert!(human.captures(HUMAN_THREAD).is_none());
        let caps = human.captures(HUMAN_SUM).unwrap();
        assert_eq!(&caps[BANDWIDTH], "3.76");
        assert_eq!(&caps[UNITS], "Gbits");

        let csv = Expression::csv(ThreadColumn::Aggregate).unwrap();
        assert!(csv.captures(CSV_THREAD).is_none());
        let caps = csv.captures(CSV_SUM).unwrap();
        assert_eq!(&caps[THREAD], "-1");
        assert_eq!(&caps[BANDWIDTH], "3770679296");
    }

    #[test]
    fn test_csv_fields() {
        let csv = Expression::csv(ThreadColumn::PerThread).unwrap();
        let caps = csv.captures(CSV_THREAD).unwrap();
        assert_eq!(&caps[TIMESTAMP], "20120518130523");
        assert_eq!(&caps[THREAD], "3");
        assert_eq!(&caps[START], "0.0");
        assert_eq!(&caps[END], "1.0");
        assert_eq!(&caps[BANDWIDTH], "942669824");
        assert!(caps.name(UNITS).is_none());
    }

    #[test]
    fn test_formats_do_not_cross_match() {
        let human = Expression::human(ThreadColumn::PerThread).unwrap();
        let csv = Expression::csv(ThreadColumn::PerThread).unwrap();
        assert!(human.captures(CSV_THREAD).is_none());
        assert!(csv.captures(HUMAN_THREAD).is_none());
    }

    #[test]
    fn test_headers_do_not_match() {
        let human = Expression::human(ThreadColumn::PerThread).unwrap();
        for line in [
            "------------------------------------------------------------",
            "Client connecting to 192.168.20.1, TCP port 5001",
            "[  3] local 192.168.20.57 port 43170 connected with 192.168.20.1 port 5001",
            "[ ID] Interval       Transfer     Bandwidth",
        ] {
            assert!(human.captures(line).is_none(), "{line}");
        }
    }

    #[test]
    fn test_sum_for() {
        assert_eq!(ThreadColumn::sum_for(1), ThreadColumn::PerThread);
        assert_eq!(ThreadColumn::sum_for(4), ThreadColumn::Aggregate);
    }
}
