//! Parser for the aggregate rows iperf prints once per interval.

use crate::aggregate::{Bandwidths, IntervalTable};
use crate::config::ParserConfig;
use crate::expressions::{LineFormat, ThreadColumn};
use crate::matcher::FormatMatcher;
use crate::parser::BandwidthParser;
use crate::sample::Sample;
use crate::units::UnitConverter;
use crate::validator::IntervalValidator;
use crate::Result;
use log::{debug, info};

/// Takes iperf's own per-interval totals (`[SUM]` rows, or thread `-1` in CSV)
/// instead of adding up threads.
///
/// With a single thread iperf prints no aggregate row, so the thread's own row
/// is used. Every accepted row is returned straight away and replaces whatever
/// was stored for its interval.
///
/// # Examples
///
/// ```
/// use iperf_parse::config::ParserConfig;
/// use iperf_parse::parser::BandwidthParser;
/// use iperf_parse::sum_parser::SumParser;
///
/// let mut parser = SumParser::new(ParserConfig::new().with_threads(4)).unwrap();
///
/// assert_eq!(parser.process("[  3]  0.0- 1.0 sec  28.0 MBytes   235 Mbits/sec").unwrap(), None);
/// assert_eq!(parser.process("[SUM]  0.0- 1.0 sec   112 MBytes  94.5 Mbits/sec").unwrap(), Some(94.5));
/// ```
#[derive(Debug, Clone)]
pub struct SumParser {
    config: ParserConfig,
    matcher: FormatMatcher,
    validator: IntervalValidator,
    converter: UnitConverter,
    intervals: IntervalTable,
    emit: bool,
}

impl SumParser {
    pub fn new(config: ParserConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            matcher: FormatMatcher::new(ThreadColumn::sum_for(config.threads))?,
            validator: IntervalValidator::from_config(&config),
            converter: UnitConverter::with_maximum(config.maximum),
            intervals: IntervalTable::new(),
            emit: true,
            config,
        })
    }

    /// Log accepted totals at info level (`true`, the default) or debug level.
    pub fn with_emit(mut self, emit: bool) -> Self {
        self.emit = emit;
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn search(&mut self, line: &str) -> Result<Option<Sample>> {
        self.matcher.search(line)
    }

    pub fn valid(&self, sample: &Sample) -> bool {
        self.validator.valid(sample)
    }

    pub fn bandwidth(&self, sample: &Sample) -> f64 {
        self.converter
            .convert(sample.bandwidth, sample.units, self.config.units)
    }

    pub fn interval(&self, start: f64) -> f64 {
        self.intervals.get(start)
    }

    pub fn intervals(&self) -> &IntervalTable {
        &self.intervals
    }
}

impl BandwidthParser for SumParser {
    fn process(&mut self, line: &str) -> Result<Option<f64>> {
        let sample = match self.matcher.search(line)? {
            Some(sample) if self.validator.valid(&sample) => sample,
            _ => return Ok(None),
        };

        let bandwidth = self.bandwidth(&sample);
        self.intervals.overwrite(sample.start, bandwidth);
        if self.emit {
            info!("({}) {} {}/sec", sample.start, bandwidth, self.config.units);
        } else {
            debug!("({}) {} {}/sec", sample.start, bandwidth, self.config.units);
        }
        Ok(Some(bandwidth))
    }

    fn bandwidths(&self) -> Bandwidths {
        self.intervals.bandwidths()
    }

    fn reset(&mut self) {
        self.matcher.reset();
        self.intervals.clear();
    }

    fn format(&self) -> Option<LineFormat> {
        self.matcher.format()
    }
}
