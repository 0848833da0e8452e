use crate::config::{ParserConfig, ToleranceMode};
use crate::sample::Sample;

/// Rejects samples whose interval width is off from the expected sampling
/// period.
///
/// In [`ToleranceMode::OneSided`] only intervals that run long are rejected:
/// `(end - start) - expected < tolerance`. This is how iperf captures have
/// always been screened. [`ToleranceMode::Absolute`] compares the magnitude of
/// the difference instead, so short intervals fail too.
///
/// # Examples
///
/// ```
/// use iperf_parse::config::ToleranceMode;
/// use iperf_parse::validator::IntervalValidator;
///
/// let validator = IntervalValidator::new(1.0, 0.1, ToleranceMode::OneSided);
/// assert!(validator.valid_width(1.05));
/// assert!(!validator.valid_width(1.2));
/// assert!(validator.valid_width(0.5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalValidator {
    expected: f64,
    tolerance: f64,
    mode: ToleranceMode,
}

impl IntervalValidator {
    pub fn new(expected: f64, tolerance: f64, mode: ToleranceMode) -> Self {
        Self {
            expected,
            tolerance,
            mode,
        }
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new(
            config.expected_interval,
            config.interval_tolerance,
            config.tolerance_mode,
        )
    }

    pub fn valid(&self, sample: &Sample) -> bool {
        self.valid_width(sample.width())
    }

    pub fn valid_width(&self, width: f64) -> bool {
        let difference = width - self.expected;
        match self.mode {
            ToleranceMode::OneSided => difference < self.tolerance,
            ToleranceMode::Absolute => difference.abs() < self.tolerance,
        }
    }
}
