//! Format detection with a sticky lock-in.

use crate::expressions::{Expression, LineFormat, ThreadColumn};
use crate::sample::Sample;
use crate::Result;
use log::debug;

/// Which layout a matcher has committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatState {
    #[default]
    Unset,
    Human,
    Csv,
}

impl FormatState {
    pub fn format(self) -> Option<LineFormat> {
        match self {
            FormatState::Unset => None,
            FormatState::Human => Some(LineFormat::Human),
            FormatState::Csv => Some(LineFormat::Csv),
        }
    }
}

impl From<LineFormat> for FormatState {
    fn from(format: LineFormat) -> Self {
        match format {
            LineFormat::Human => FormatState::Human,
            LineFormat::Csv => FormatState::Csv,
        }
    }
}

/// Matches lines against the human and CSV expressions.
///
/// The first line that matches either layout locks the matcher to it. After
/// that only the locked layout is tried, until [`reset`](Self::reset).
///
/// # Examples
///
/// ```
/// use iperf_parse::expressions::{LineFormat, ThreadColumn};
/// use iperf_parse::matcher::FormatMatcher;
///
/// let mut matcher = FormatMatcher::new(ThreadColumn::PerThread).unwrap();
/// assert!(matcher.search("Client connecting to 10.0.0.1").unwrap().is_none());
///
/// let sample = matcher
///     .search("[  3]  0.0- 1.0 sec   112 MBytes   941 Mbits/sec")
///     .unwrap()
///     .unwrap();
/// assert_eq!(sample.bandwidth, 941.0);
/// assert_eq!(matcher.format(), Some(LineFormat::Human));
/// ```
#[derive(Debug, Clone)]
pub struct FormatMatcher {
    human: Expression,
    csv: Expression,
    state: FormatState,
}

impl FormatMatcher {
    pub fn new(column: ThreadColumn) -> Result<Self> {
        Ok(Self {
            human: Expression::human(column)?,
            csv: Expression::csv(column)?,
            state: FormatState::Unset,
        })
    }

    pub fn state(&self) -> FormatState {
        self.state
    }

    pub fn format(&self) -> Option<LineFormat> {
        self.state.format()
    }

    fn expression(&self, format: LineFormat) -> &Expression {
        match format {
            LineFormat::Human => &self.human,
            LineFormat::Csv => &self.csv,
        }
    }

    /// Returns the sample on `line`, or `None` if the line does not match.
    ///
    /// Fails only when a line matches but one of its numbers does not parse.
    pub fn search(&mut self, line: &str) -> Result<Option<Sample>> {
        if let Some(format) = self.state.format() {
            return match self.expression(format).captures(line) {
                Some(caps) => Sample::from_captures(format, &caps).map(Some),
                None => Ok(None),
            };
        }

        for format in [LineFormat::Human, LineFormat::Csv] {
            if let Some(caps) = self.expression(format).captures(line) {
                debug!("Matched: {}", line.trim_end());
                self.state = FormatState::from(format);
                debug!("Setting format to {}", format);
                return Sample::from_captures(format, &caps).map(Some);
            }
        }
        debug!("{} skipped, format not set", line.trim_end());
        Ok(None)
    }

    /// Forgets the locked format.
    pub fn reset(&mut self) {
        self.state = FormatState::Unset;
    }
}
