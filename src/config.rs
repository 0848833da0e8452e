use crate::units::Unit;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the interval validator compares a sample's width against the expected
/// reporting interval.
///
/// # Examples
///
/// ```
/// use iperf_parse::config::ToleranceMode;
///
/// // The default only rejects intervals that run long.
/// assert_eq!(ToleranceMode::default(), ToleranceMode::OneSided);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceMode {
    /// `(end - start) - expected < tolerance`; short intervals always pass
    #[default]
    OneSided,
    /// `|(end - start) - expected| < tolerance`
    Absolute,
}

/// Configuration shared by the parsers and the streaming pipe.
///
/// Use the builder methods to customize the defaults, then hand the config to
/// a parser constructor, which validates it.
///
/// # Examples
///
/// ```
/// use iperf_parse::config::ParserConfig;
/// use iperf_parse::units::Unit;
/// use std::time::Duration;
///
/// let config = ParserConfig::new()
///     .with_threads(8)
///     .with_units(Unit::Gbits)
///     .with_expected_interval(2.0)
///     .with_quorum_timeout(Duration::from_secs(10));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Seconds between iperf sample reports
    pub expected_interval: f64,

    /// Allowed difference between the reported and expected interval width
    pub interval_tolerance: f64,

    /// Comparison used for the tolerance check
    pub tolerance_mode: ToleranceMode,

    /// Units bandwidths are converted to
    pub units: Unit,

    /// Number of parallel iperf threads
    pub threads: usize,

    /// Largest converted value accepted; anything above is reported as 0.0
    pub maximum: f64,

    /// How long the streaming pipe waits for a full quorum before force-emitting
    #[serde(with = "duration_secs")]
    pub quorum_timeout: Duration,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            expected_interval: 1.0,
            interval_tolerance: 0.1,
            tolerance_mode: ToleranceMode::OneSided,
            units: Unit::Mbits,
            threads: 4,
            maximum: 1e9,
            quorum_timeout: Duration::from_secs(5),
        }
    }
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use iperf_parse::config::ParserConfig;
    /// use iperf_parse::units::Unit;
    ///
    /// let config = ParserConfig::from_json(r#"{"threads": 2, "units": "KBytes"}"#).unwrap();
    /// assert_eq!(config.threads, 2);
    /// assert_eq!(config.units, Unit::KBytes);
    /// assert_eq!(config.expected_interval, 1.0);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ParserConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the reporting interval iperf was started with (its `-i`).
    ///
    /// # Arguments
    ///
    /// * `seconds` - Expected width of each reported interval
    ///
    /// # Examples
    ///
    /// ```
    /// use iperf_parse::config::ParserConfig;
    ///
    /// let config = ParserConfig::new().with_expected_interval(0.5);
    /// assert_eq!(config.expected_interval, 0.5);
    /// ```
    pub fn with_expected_interval(mut self, seconds: f64) -> Self {
        self.expected_interval = seconds;
        self
    }

    /// Sets how far an interval may run past the expected width.
    ///
    /// # Arguments
    ///
    /// * `seconds` - Allowed overrun; rows at or beyond it are skipped
    ///
    /// # Examples
    ///
    /// ```
    /// use iperf_parse::config::ParserConfig;
    ///
    /// let config = ParserConfig::new().with_interval_tolerance(0.25);
    /// assert_eq!(config.interval_tolerance, 0.25);
    /// ```
    pub fn with_interval_tolerance(mut self, seconds: f64) -> Self {
        self.interval_tolerance = seconds;
        self
    }

    /// Sets whether short intervals are checked as well as long ones.
    ///
    /// # Arguments
    ///
    /// * `mode` - `ToleranceMode::OneSided` or `ToleranceMode::Absolute`
    ///
    /// # Examples
    ///
    /// ```
    /// use iperf_parse::config::{ParserConfig, ToleranceMode};
    ///
    /// let config = ParserConfig::new().with_tolerance_mode(ToleranceMode::Absolute);
    /// assert_eq!(config.tolerance_mode, ToleranceMode::Absolute);
    /// ```
    pub fn with_tolerance_mode(mut self, mode: ToleranceMode) -> Self {
        self.tolerance_mode = mode;
        self
    }

    /// Sets the units bandwidths are reported in.
    ///
    /// # Arguments
    ///
    /// * `units` - Target unit for every converted value
    ///
    /// # Examples
    ///
    /// ```
    /// use iperf_parse::config::ParserConfig;
    /// use iperf_parse::units::Unit;
    ///
    /// let config = ParserConfig::new().with_units(Unit::Gbits);
    /// assert_eq!(config.units, Unit::Gbits);
    /// ```
    pub fn with_units(mut self, units: Unit) -> Self {
        self.units = units;
        self
    }

    /// Sets the number of parallel threads (iperf's `-P`).
    ///
    /// # Arguments
    ///
    /// * `threads` - Rows per interval; must be at least 1
    ///
    /// # Examples
    ///
    /// ```
    /// use iperf_parse::config::ParserConfig;
    ///
    /// let config = ParserConfig::new().with_threads(8);
    /// assert_eq!(config.threads, 8);
    /// ```
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the largest believable bandwidth.
    ///
    /// Converted values above it are reported as `0.0`.
    ///
    /// # Arguments
    ///
    /// * `maximum` - Ceiling, in the configured units
    ///
    /// # Examples
    ///
    /// ```
    /// use iperf_parse::config::ParserConfig;
    ///
    /// let config = ParserConfig::new().with_maximum(10_000.0);
    /// assert_eq!(config.maximum, 10_000.0);
    /// ```
    pub fn with_maximum(mut self, maximum: f64) -> Self {
        self.maximum = maximum;
        self
    }

    /// Sets how long the streaming pipe waits for every thread of an
    /// interval before reporting it incomplete.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Wait measured from the interval's first row
    ///
    /// # Examples
    ///
    /// ```
    /// use iperf_parse::config::ParserConfig;
    /// use std::time::Duration;
    ///
    /// let config = ParserConfig::new().with_quorum_timeout(Duration::from_secs(2));
    /// assert_eq!(config.quorum_timeout, Duration::from_secs(2));
    /// ```
    pub fn with_quorum_timeout(mut self, timeout: Duration) -> Self {
        self.quorum_timeout = timeout;
        self
    }

    /// Checks the values a parser cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::Config("threads must be at least 1".to_string()));
        }
        if !self.expected_interval.is_finite() || self.expected_interval < 0.0 {
            return Err(Error::Config(format!(
                "expected interval must be a non-negative number of seconds, got {}",
                self.expected_interval
            )));
        }
        if !self.interval_tolerance.is_finite() || self.interval_tolerance < 0.0 {
            return Err(Error::Config(format!(
                "interval tolerance must be a non-negative number of seconds, got {}",
                self.interval_tolerance
            )));
        }
        if self.maximum.is_nan() || self.maximum < 0.0 {
            return Err(Error::Config(format!(
                "maximum must be non-negative, got {}",
                self.maximum
            )));
        }
        if self.quorum_timeout.is_zero() {
            return Err(Error::Config("quorum timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ParserConfig::default();
        assert_eq!(config.expected_interval, 1.0);
        assert_eq!(config.interval_tolerance, 0.1);
        assert_eq!(config.units, Unit::Mbits);
        assert_eq!(config.threads, 4);
        assert_eq!(config.maximum, 1e9);
        assert_eq!(config.tolerance_mode, ToleranceMode::OneSided);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = ParserConfig::new().with_threads(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_numbers_rejected() {
        assert!(ParserConfig::new().with_interval_tolerance(-0.1).validate().is_err());
        assert!(ParserConfig::new().with_expected_interval(f64::NAN).validate().is_err());
        assert!(ParserConfig::new().with_maximum(-1.0).validate().is_err());
        assert!(ParserConfig::new()
            .with_quorum_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ParserConfig::new()
            .with_threads(2)
            .with_tolerance_mode(ToleranceMode::Absolute)
            .with_quorum_timeout(Duration::from_millis(1500));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"absolute\""));
        assert!(json.contains("\"quorum_timeout\":1.5"));
        let parsed = ParserConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_json_validates() {
        let err = ParserConfig::from_json(r#"{"threads": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = ParserConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
