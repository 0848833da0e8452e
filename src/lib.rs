//! iperf-parse - bandwidth figures from iperf output
//!
//! This library turns the text iperf prints into bandwidth numbers. It works on
//! finished captures as well as on live output read line by line from a
//! running test.
//!
//! # Features
//!
//! - Detects human-readable and CSV (`-y c`) output on its own
//! - Screens out rows whose interval is longer than the sampling period
//! - Converts between bit and byte units, zeroing nonsensical readings
//! - Adds up per-thread rows, or takes iperf's `[SUM]` rows directly
//! - Skips lines with stray non-UTF-8 bytes instead of failing
//! - Streams live output through an async task with a quorum timeout

pub mod aggregate;
pub mod config;
pub mod error;
pub mod expressions;
pub mod lines;
pub mod matcher;
pub mod parser;
pub mod pipe;
pub mod sample;
pub mod stages;
pub mod sum_parser;
pub mod timestamp;
pub mod units;
pub mod validator;

pub use aggregate::{Bandwidths, IntervalBandwidth};
pub use config::{ParserConfig, ToleranceMode};
pub use error::{Error, Result};
pub use expressions::LineFormat;
pub use parser::{BandwidthParser, IperfParser};
pub use pipe::{BandwidthSink, IntervalReport, StreamingPipe};
pub use sample::Sample;
pub use sum_parser::SumParser;
pub use units::{Unit, UnitConverter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
