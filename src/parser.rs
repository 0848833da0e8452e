//! Per-thread iperf output parser.

use crate::aggregate::{Bandwidths, IntervalTable};
use crate::config::ParserConfig;
use crate::expressions::{LineFormat, ThreadColumn};
use crate::matcher::FormatMatcher;
use crate::sample::Sample;
use crate::units::UnitConverter;
use crate::validator::IntervalValidator;
use crate::Result;
use log::debug;
use std::path::Path;

/// Common interface of the line-by-line bandwidth parsers.
pub trait BandwidthParser {
    /// Feeds one line of iperf output.
    ///
    /// Returns a converted bandwidth when the line closes something worth
    /// reporting, `None` for noise and for rows that are only accumulated.
    fn process(&mut self, line: &str) -> Result<Option<f64>>;

    /// Ascending interval totals accumulated so far.
    fn bandwidths(&self) -> Bandwidths;

    /// Clears the locked format and all accumulated state.
    fn reset(&mut self);

    /// The layout the parser has locked onto, if any.
    fn format(&self) -> Option<LineFormat>;

    /// Feeds a whole finished capture and returns the resulting totals.
    fn parse_lines<I, S>(&mut self, lines: I) -> Result<Bandwidths>
    where
        Self: Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.process(line.as_ref())?;
        }
        Ok(self.bandwidths())
    }
}

/// Sums per-thread rows into interval totals.
///
/// Rows are counted, not identified: every `threads` accepted rows close one
/// thread cycle. iperf prints one row per thread per interval, in order, so
/// this lines up with the intervals. A dropped or reordered row shifts every
/// later cycle; use [`StreamingPipe`](crate::pipe::StreamingPipe) for feeds
/// where that can happen.
///
/// # Examples
///
/// ```
/// use iperf_parse::config::ParserConfig;
/// use iperf_parse::parser::{BandwidthParser, IperfParser};
///
/// let mut parser = IperfParser::new(ParserConfig::new().with_threads(2)).unwrap();
///
/// assert_eq!(parser.process("[  3]  0.0- 1.0 sec  56.0 MBytes   470 Mbits/sec").unwrap(), None);
/// assert_eq!(parser.process("[  4]  0.0- 1.0 sec  56.2 MBytes   471 Mbits/sec").unwrap(), Some(471.0));
/// assert_eq!(parser.interval(0.0), 941.0);
/// ```
#[derive(Debug, Clone)]
pub struct IperfParser {
    config: ParserConfig,
    matcher: FormatMatcher,
    validator: IntervalValidator,
    converter: UnitConverter,
    intervals: IntervalTable,
    thread_count: usize,
    current_thread: Option<f64>,
}

impl IperfParser {
    /// Creates a parser, rejecting configurations it cannot work with
    /// (such as zero threads).
    pub fn new(config: ParserConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            matcher: FormatMatcher::new(ThreadColumn::PerThread)?,
            validator: IntervalValidator::from_config(&config),
            converter: UnitConverter::with_maximum(config.maximum),
            intervals: IntervalTable::new(),
            thread_count: 0,
            current_thread: None,
            config,
        })
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Matches a line without touching the interval totals.
    pub fn search(&mut self, line: &str) -> Result<Option<Sample>> {
        self.matcher.search(line)
    }

    pub fn valid(&self, sample: &Sample) -> bool {
        self.validator.valid(sample)
    }

    /// The sample's bandwidth in the configured units, zeroed above the maximum.
    pub fn bandwidth(&self, sample: &Sample) -> f64 {
        self.converter
            .convert(sample.bandwidth, sample.units, self.config.units)
    }

    /// Total for the interval starting at `start`; zero if never seen.
    pub fn interval(&self, start: f64) -> f64 {
        self.intervals.get(start)
    }

    pub fn intervals(&self) -> &IntervalTable {
        &self.intervals
    }

    /// Position within the current thread cycle.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Interval start of the most recently closed thread cycle.
    pub fn current_thread(&self) -> Option<f64> {
        self.current_thread
    }
}

impl BandwidthParser for IperfParser {
    fn process(&mut self, line: &str) -> Result<Option<f64>> {
        let sample = match self.matcher.search(line)? {
            Some(sample) => sample,
            None => return Ok(None),
        };
        if !self.validator.valid(&sample) {
            debug!(
                "Interval {}-{} outside tolerance, skipped",
                sample.start, sample.end
            );
            return Ok(None);
        }

        self.thread_count = (self.thread_count + 1) % self.config.threads;
        let bandwidth = self.bandwidth(&sample);
        let closed = if self.thread_count == 0 {
            self.current_thread = Some(sample.start);
            Some(bandwidth)
        } else {
            None
        };
        self.intervals.accumulate(sample.start, bandwidth);
        Ok(closed)
    }

    fn bandwidths(&self) -> Bandwidths {
        self.intervals.bandwidths()
    }

    fn reset(&mut self) {
        self.matcher.reset();
        self.intervals.clear();
        self.thread_count = 0;
        self.current_thread = None;
    }

    fn format(&self) -> Option<LineFormat> {
        self.matcher.format()
    }
}

/// Name of the CSV file that goes with a raw iperf capture.
///
/// # Examples
///
/// ```
/// use iperf_parse::parser::csv_filename;
///
/// assert_eq!(csv_filename("run_01.iperf"), "run_01.csv");
/// assert_eq!(csv_filename("run_01"), "run_01.csv");
/// ```
pub fn csv_filename(basename: &str) -> String {
    Path::new(basename)
        .with_extension("csv")
        .to_string_lossy()
        .into_owned()
}
