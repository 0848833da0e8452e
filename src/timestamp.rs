//! Timestamp formats used in iperf CSV output and in captured log lines.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// The compact stamp iperf writes at the start of every CSV line.
pub const IPERF_FORMAT: &str = "%Y%m%d%H%M%S";

/// The stamp prepended to watched log lines.
pub const LOG_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    Iperf,
    #[default]
    Log,
}

impl TimestampFormat {
    pub fn pattern(self) -> &'static str {
        match self {
            TimestampFormat::Iperf => IPERF_FORMAT,
            TimestampFormat::Log => LOG_FORMAT,
        }
    }

    /// The current local time in this format.
    pub fn now(self) -> String {
        Local::now().format(self.pattern()).to_string()
    }

    /// Formats seconds since the epoch as local time.
    ///
    /// Returns `None` for values chrono cannot represent.
    pub fn convert(self, epoch_seconds: f64) -> Option<String> {
        let secs = epoch_seconds.floor();
        let nanos = ((epoch_seconds - secs) * 1e9) as u32;
        let time: DateTime<Local> = Local.timestamp_opt(secs as i64, nanos).single()?;
        Some(time.format(self.pattern()).to_string())
    }

    pub fn parse(self, text: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(text, self.pattern()).ok()
    }
}

/// Parses the leading stamp of an iperf CSV line.
///
/// Newer iperf builds append milliseconds (`20120518130523.123`); the
/// fractional part is ignored.
///
/// # Examples
///
/// ```
/// use iperf_parse::timestamp::parse_iperf_timestamp;
/// use chrono::Timelike;
///
/// let stamp = parse_iperf_timestamp("20120518130523").unwrap();
/// assert_eq!(stamp.hour(), 13);
/// assert!(parse_iperf_timestamp("yesterday").is_none());
/// ```
pub fn parse_iperf_timestamp(text: &str) -> Option<NaiveDateTime> {
    let whole = text.split('.').next().unwrap_or(text);
    TimestampFormat::Iperf.parse(whole)
}
