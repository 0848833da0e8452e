//! Push-style line stages.
//!
//! Each stage takes one line through [`Stage::send`], does its bit of work and
//! optionally forwards to the next stage before returning. Stages compose into
//! small pipelines, for example teeing one line to two writers:
//!
//! ```
//! use iperf_parse::stages::{Broadcast, LineOutput, Stage};
//!
//! let targets: Vec<Box<dyn Stage>> = vec![
//!     Box::new(LineOutput::new(Vec::<u8>::new())),
//!     Box::new(LineOutput::new(Vec::<u8>::new())),
//! ];
//! let mut tee = Broadcast::new(targets);
//! tee.send("[  3]  0.0- 1.0 sec   112 MBytes   941 Mbits/sec").unwrap();
//! ```

use crate::pipe::{BandwidthSink, IntervalReport};
use crate::timestamp::TimestampFormat;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const COMMA: &str = ",";
const NEWLINE: char = '\n';

/// A consumer of lines.
pub trait Stage: Send {
    fn send(&mut self, line: &str) -> Result<()>;
}

impl Stage for Box<dyn Stage> {
    fn send(&mut self, line: &str) -> Result<()> {
        (**self).send(line)
    }
}

/// Sends every line to each of its targets, in order.
pub struct Broadcast {
    targets: Vec<Box<dyn Stage>>,
}

impl Broadcast {
    pub fn new(targets: Vec<Box<dyn Stage>>) -> Self {
        Self { targets }
    }

    pub fn push(&mut self, target: Box<dyn Stage>) {
        self.targets.push(target);
    }
}

impl Stage for Broadcast {
    fn send(&mut self, line: &str) -> Result<()> {
        for target in &mut self.targets {
            target.send(line)?;
        }
        Ok(())
    }
}

/// Collects `input_count` lines and forwards them as one comma-joined line,
/// last received first.
///
/// When several sources feed one `CommaJoin` in turn, the reversal puts the
/// source that is furthest upstream (the one sending last) in the first
/// column.
pub struct CommaJoin<S> {
    target: S,
    input_count: usize,
    inputs: Vec<String>,
}

impl<S: Stage> CommaJoin<S> {
    pub fn new(target: S, input_count: usize) -> Self {
        Self {
            target,
            input_count: input_count.max(1),
            inputs: Vec::with_capacity(input_count),
        }
    }

    pub fn into_inner(self) -> S {
        self.target
    }
}

impl<S: Stage> Stage for CommaJoin<S> {
    fn send(&mut self, line: &str) -> Result<()> {
        self.inputs.push(line.trim_end_matches(NEWLINE).to_string());
        if self.inputs.len() < self.input_count {
            return Ok(());
        }
        self.inputs.reverse();
        let joined = self.inputs.join(COMMA);
        self.inputs.clear();
        self.target.send(&joined)
    }
}

/// Appends each received line to the next line of `source`:
/// `"{source line},{received line}"`.
///
/// Fails once the source runs out.
pub struct CommaAppend<I, S> {
    source: I,
    target: S,
}

impl<I, S> CommaAppend<I, S>
where
    I: Iterator<Item = String> + Send,
    S: Stage,
{
    pub fn new(source: I, target: S) -> Self {
        Self { source, target }
    }

    pub fn into_inner(self) -> S {
        self.target
    }
}

impl<I, S> Stage for CommaAppend<I, S>
where
    I: Iterator<Item = String> + Send,
    S: Stage,
{
    fn send(&mut self, line: &str) -> Result<()> {
        let head = self
            .source
            .next()
            .ok_or_else(|| Error::Pipe("comma append source is exhausted".to_string()))?;
        let joined = format!("{}{}{}", head.trim_end_matches(NEWLINE), COMMA, line);
        self.target.send(&joined)
    }
}

/// Writes lines to a writer, each ending in exactly one newline.
pub struct LineOutput<W> {
    writer: W,
}

impl<W: Write + Send> LineOutput<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> Stage for LineOutput<W> {
    fn send(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.trim_end_matches(NEWLINE).as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// A [`LineOutput`] writing to a newly created file.
pub type FileOutput = LineOutput<BufWriter<File>>;

impl FileOutput {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(LineOutput::new(BufWriter::new(File::create(path)?)))
    }
}

/// Prefixes each line with the current time: `"{timestamp},{line}"`.
///
/// Blank lines are dropped.
pub struct Timestamped<S> {
    target: S,
    format: TimestampFormat,
}

impl<S: Stage> Timestamped<S> {
    pub fn new(target: S, format: TimestampFormat) -> Self {
        Self { target, format }
    }

    pub fn into_inner(self) -> S {
        self.target
    }
}

impl<S: Stage> Stage for Timestamped<S> {
    fn send(&mut self, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        let stamped = format!("{}{}{}", self.format.now(), COMMA, line);
        self.target.send(&stamped)
    }
}

/// Writes pipe reports to a stage as `"{start},{bandwidth}"` lines.
pub struct SinkStage<S> {
    target: S,
}

impl<S: Stage> SinkStage<S> {
    pub fn new(target: S) -> Self {
        Self { target }
    }

    pub fn into_inner(self) -> S {
        self.target
    }
}

impl<S: Stage> BandwidthSink for SinkStage<S> {
    fn on_interval(&mut self, report: IntervalReport) -> Result<()> {
        self.target
            .send(&format!("{}{}{}", report.start, COMMA, report.bandwidth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Stage that records what reaches it
    #[derive(Clone, Default)]
    struct Recorder {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().clone()
        }
    }

    impl Stage for Recorder {
        fn send(&mut self, line: &str) -> Result<()> {
            self.lines.lock().push(line.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_broadcast_reaches_every_target() {
        let first = Recorder::default();
        let second = Recorder::default();
        let targets: Vec<Box<dyn Stage>> = vec![Box::new(first.clone())];
        let mut broadcast = Broadcast::new(targets);
        broadcast.push(Box::new(second.clone()));

        broadcast.send("a").unwrap();
        broadcast.send("b").unwrap();
        assert_eq!(first.lines(), vec!["a", "b"]);
        assert_eq!(second.lines(), vec!["a", "b"]);
    }

    #[test]
    fn test_comma_join_reverses_inputs() {
        let recorder = Recorder::default();
        let mut join = CommaJoin::new(recorder.clone(), 3);
        join.send("c\n").unwrap();
        join.send("b").unwrap();
        assert!(recorder.lines().is_empty());
        join.send("a").unwrap();
        join.send("f").unwrap();
        join.send("e").unwrap();
        join.send("d").unwrap();
        assert_eq!(recorder.lines(), vec!["a,b,c", "d,e,f"]);
    }

    #[test]
    fn test_comma_append() {
        let recorder = Recorder::default();
        let source = vec!["12:00:00\n".to_string(), "12:00:01".to_string()].into_iter();
        let mut append = CommaAppend::new(source, recorder.clone());
        append.send("941").unwrap();
        append.send("940").unwrap();
        assert!(matches!(append.send("939"), Err(Error::Pipe(_))));
        assert_eq!(recorder.lines(), vec!["12:00:00,941", "12:00:01,940"]);
    }

    #[test]
    fn test_line_output_one_newline() {
        let mut output = LineOutput::new(Vec::new());
        output.send("first").unwrap();
        output.send("second\n").unwrap();
        let text = String::from_utf8(output.into_inner()).unwrap();
        assert_eq!(text, "first\nsecond\n");
    }

    #[test]
    fn test_file_output() {
        let path = std::env::temp_dir().join(format!("iperf-parse-stage-{}.csv", std::process::id()));
        {
            let mut output = FileOutput::create(&path).unwrap();
            output.send("0,941").unwrap();
            output.flush().unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "0,941\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_timestamped_skips_blank_lines() {
        let recorder = Recorder::default();
        let mut stamped = Timestamped::new(recorder.clone(), TimestampFormat::Iperf);
        stamped.send("   ").unwrap();
        stamped.send("wlan0: associated").unwrap();

        let lines = recorder.lines();
        assert_eq!(lines.len(), 1);
        let (stamp, rest) = lines[0].split_once(',').unwrap();
        assert_eq!(stamp.len(), 14);
        assert_eq!(rest, "wlan0: associated");
    }

    #[test]
    fn test_sink_stage() {
        let recorder = Recorder::default();
        let mut sink = SinkStage::new(recorder.clone());
        sink.on_interval(IntervalReport {
            start: 1.0,
            bandwidth: 941.5,
            threads: 4,
            complete: true,
        })
        .unwrap();
        assert_eq!(recorder.lines(), vec!["1,941.5"]);
    }
}
