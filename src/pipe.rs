//! Push-driven aggregation for live iperf output.
//!
//! A [`StreamingPipe`] is fed one line at a time and emits an
//! [`IntervalReport`] as soon as the oldest pending interval has heard from
//! every thread. Unlike [`IperfParser`](crate::parser::IperfParser) it counts
//! arrivals per interval instead of relying on row order, so a missing row
//! delays one interval rather than shifting all of them. Intervals that never
//! reach quorum are force-emitted after `quorum_timeout`, flagged incomplete.
//!
//! For use from async code, [`run_pipe_task`] drives a pipe from a channel
//! fed through a [`PipeHandle`].

use crate::aggregate::IntervalKey;
use crate::config::ParserConfig;
use crate::expressions::{LineFormat, ThreadColumn};
use crate::matcher::FormatMatcher;
use crate::units::{Unit, UnitConverter};
use crate::validator::IntervalValidator;
use crate::{Error, Result};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A combined bandwidth emitted by the pipe.
///
/// # Examples
///
/// ```
/// use iperf_parse::pipe::IntervalReport;
///
/// let report = IntervalReport {
///     start: 3.0,
///     bandwidth: 941.2,
///     threads: 4,
///     complete: true,
/// };
/// assert_eq!(report.bandwidth, 941.2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalReport {
    /// Interval start in seconds
    pub start: f64,
    /// Sum of the rows received for the interval, in the configured units
    pub bandwidth: f64,
    /// Number of rows that contributed
    pub threads: usize,
    /// `false` if the interval was flushed or timed out before quorum
    pub complete: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingInterval {
    threads: usize,
    bandwidth: f64,
    first_seen: Instant,
}

/// Whether the pipe adds up per-thread rows or passes aggregate rows through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeMode {
    Threads,
    Sum,
}

/// Interval aggregation for a live feed of iperf output.
#[derive(Debug, Clone)]
pub struct StreamingPipe {
    mode: PipeMode,
    matcher: FormatMatcher,
    validator: IntervalValidator,
    converter: UnitConverter,
    units: Unit,
    quorum: usize,
    quorum_timeout: Duration,
    pending: BTreeMap<IntervalKey, PendingInterval>,
    last_emitted: Option<IntervalKey>,
}

impl StreamingPipe {
    /// A pipe that adds up `config.threads` per-thread rows per interval.
    ///
    /// # Examples
    ///
    /// ```
    /// use iperf_parse::config::ParserConfig;
    /// use iperf_parse::pipe::StreamingPipe;
    ///
    /// let mut pipe = StreamingPipe::threads(ParserConfig::new().with_threads(2)).unwrap();
    /// assert!(pipe.push("[  4]  0.0- 1.0 sec  56.2 MBytes   471 Mbits/sec").unwrap().is_empty());
    ///
    /// let reports = pipe.push("[  3]  0.0- 1.0 sec  56.0 MBytes   470 Mbits/sec").unwrap();
    /// assert_eq!(reports[0].bandwidth, 941.0);
    /// assert!(reports[0].complete);
    /// ```
    pub fn threads(config: ParserConfig) -> Result<Self> {
        Self::new(PipeMode::Threads, config)
    }

    /// A pipe that emits each aggregate row as soon as it arrives.
    pub fn sum(config: ParserConfig) -> Result<Self> {
        Self::new(PipeMode::Sum, config)
    }

    pub fn new(mode: PipeMode, config: ParserConfig) -> Result<Self> {
        config.validate()?;
        let (column, quorum) = match mode {
            PipeMode::Threads => (ThreadColumn::PerThread, config.threads),
            PipeMode::Sum => (ThreadColumn::sum_for(config.threads), 1),
        };
        Ok(Self {
            mode,
            matcher: FormatMatcher::new(column)?,
            validator: IntervalValidator::from_config(&config),
            converter: UnitConverter::with_maximum(config.maximum),
            units: config.units,
            quorum,
            quorum_timeout: config.quorum_timeout,
            pending: BTreeMap::new(),
            last_emitted: None,
        })
    }

    pub fn mode(&self) -> PipeMode {
        self.mode
    }

    /// Rows needed before an interval is emitted.
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn quorum_timeout(&self) -> Duration {
        self.quorum_timeout
    }

    pub fn format(&self) -> Option<LineFormat> {
        self.matcher.format()
    }

    /// Number of intervals still waiting for rows.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Start of the most recently emitted interval.
    pub fn last_emitted(&self) -> Option<f64> {
        self.last_emitted.map(IntervalKey::seconds)
    }

    pub fn push(&mut self, line: &str) -> Result<Vec<IntervalReport>> {
        self.push_at(line, Instant::now())
    }

    /// Feeds one line, using `now` as its arrival time.
    pub fn push_at(&mut self, line: &str, now: Instant) -> Result<Vec<IntervalReport>> {
        let sample = match self.matcher.search(line)? {
            Some(sample) if self.validator.valid(&sample) => sample,
            _ => return Ok(Vec::new()),
        };

        let key = IntervalKey(sample.start);
        if self.last_emitted.is_some_and(|last| key <= last) {
            debug!("Row for interval {} arrived after it was emitted, dropped", sample.start);
            return Ok(Vec::new());
        }

        let bandwidth = self
            .converter
            .convert(sample.bandwidth, sample.units, self.units);
        let pending = self.pending.entry(key).or_insert(PendingInterval {
            threads: 0,
            bandwidth: 0.0,
            first_seen: now,
        });
        pending.threads += 1;
        pending.bandwidth += bandwidth;

        Ok(self.drain_complete())
    }

    /// Force-emits the oldest intervals that have waited at least
    /// `quorum_timeout` since their first row, plus any complete intervals
    /// that were queued behind them.
    pub fn expire(&mut self, now: Instant) -> Vec<IntervalReport> {
        let mut reports = Vec::new();
        while self.oldest_is_stale(now) {
            if let Some((key, pending)) = self.pending.pop_first() {
                warn!(
                    "Interval {} timed out with {}/{} threads",
                    key.seconds(),
                    pending.threads,
                    self.quorum
                );
                reports.push(self.emit(key, pending));
                reports.extend(self.drain_complete());
            }
        }
        reports
    }

    /// Emits every pending interval in order, complete or not.
    pub fn flush(&mut self) -> Vec<IntervalReport> {
        let mut reports = Vec::with_capacity(self.pending.len());
        while let Some((key, pending)) = self.pending.pop_first() {
            reports.push(self.emit(key, pending));
        }
        reports
    }

    /// Drops pending rows, the locked format and the emitted watermark.
    pub fn reset(&mut self) {
        self.matcher.reset();
        self.pending.clear();
        self.last_emitted = None;
    }

    fn oldest_is_stale(&self, now: Instant) -> bool {
        self.pending
            .first_key_value()
            .map(|(_, pending)| {
                now.saturating_duration_since(pending.first_seen) >= self.quorum_timeout
            })
            .unwrap_or(false)
    }

    fn drain_complete(&mut self) -> Vec<IntervalReport> {
        let mut reports = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if entry.get().threads < self.quorum {
                break;
            }
            let (key, pending) = entry.remove_entry();
            reports.push(self.emit(key, pending));
        }
        reports
    }

    fn emit(&mut self, key: IntervalKey, pending: PendingInterval) -> IntervalReport {
        self.last_emitted = Some(key);
        IntervalReport {
            start: key.seconds(),
            bandwidth: pending.bandwidth,
            threads: pending.threads,
            complete: pending.threads >= self.quorum,
        }
    }
}

/// Receives the reports a pipe emits.
///
/// Implemented for any `FnMut(IntervalReport) + Send` closure.
pub trait BandwidthSink: Send {
    fn on_interval(&mut self, report: IntervalReport) -> Result<()>;
}

impl<F> BandwidthSink for F
where
    F: FnMut(IntervalReport) + Send,
{
    fn on_interval(&mut self, report: IntervalReport) -> Result<()> {
        self(report);
        Ok(())
    }
}

/// Thread-safe sink that keeps every report it receives.
///
/// Clones share the same storage, so one clone can be handed to a pipe task
/// while another is read from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct IntervalCollector {
    inner: Arc<Mutex<Vec<IntervalReport>>>,
}

impl IntervalCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<IntervalReport> {
        self.inner.lock().clone()
    }

    pub fn bandwidths(&self) -> Vec<f64> {
        self.inner.lock().iter().map(|r| r.bandwidth).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl BandwidthSink for IntervalCollector {
    fn on_interval(&mut self, report: IntervalReport) -> Result<()> {
        self.inner.lock().push(report);
        Ok(())
    }
}

/// Message sent to a running pipe task
#[derive(Debug, Clone)]
pub enum PipeMessage {
    /// One line of iperf output
    Line(String),
    /// Emit everything pending now
    Flush,
    /// Flush and stop
    Complete,
}

/// Handle for feeding a pipe task
#[derive(Debug, Clone)]
pub struct PipeHandle {
    sender: mpsc::UnboundedSender<PipeMessage>,
}

impl PipeHandle {
    /// Creates a handle and the receiver the pipe task should consume.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipeMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn line(&self, line: impl Into<String>) -> Result<()> {
        self.send(PipeMessage::Line(line.into()))
    }

    pub fn flush(&self) -> Result<()> {
        self.send(PipeMessage::Flush)
    }

    pub fn complete(&self) -> Result<()> {
        self.send(PipeMessage::Complete)
    }

    fn send(&self, message: PipeMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| Error::Pipe("pipe task is no longer running".to_string()))
    }
}

/// Counters returned when a pipe task finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeSummary {
    /// Lines received
    pub lines: u64,
    /// Intervals emitted, complete or not
    pub emitted: u64,
    /// Intervals emitted without a full quorum
    pub incomplete: u64,
    /// Lines that matched but could not be parsed
    pub errors: u64,
}

/// Runs a pipe until [`PipeMessage::Complete`], the last handle is dropped, or
/// `cancel` fires. Pending intervals are flushed on the way out.
///
/// Stale intervals are expired on a tick of half the quorum timeout. Rows that
/// match but fail to parse are logged and counted; sink failures end the task.
pub async fn run_pipe_task<S: BandwidthSink>(
    mut receiver: mpsc::UnboundedReceiver<PipeMessage>,
    mut pipe: StreamingPipe,
    mut sink: S,
    cancel: CancellationToken,
) -> Result<PipeSummary> {
    let mut summary = PipeSummary::default();
    let period = (pipe.quorum_timeout() / 2).max(Duration::from_millis(1));
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Pipe task cancelled");
                break;
            }
            message = receiver.recv() => match message {
                Some(PipeMessage::Line(line)) => {
                    summary.lines += 1;
                    match pipe.push(&line) {
                        Ok(reports) => deliver(&mut sink, reports, &mut summary)?,
                        Err(e) => {
                            warn!("Skipping unparseable row {:?}: {}", line.trim_end(), e);
                            summary.errors += 1;
                        }
                    }
                }
                Some(PipeMessage::Flush) => deliver(&mut sink, pipe.flush(), &mut summary)?,
                Some(PipeMessage::Complete) | None => break,
            },
            _ = ticker.tick() => {
                deliver(&mut sink, pipe.expire(Instant::now()), &mut summary)?;
            }
        }
    }

    deliver(&mut sink, pipe.flush(), &mut summary)?;
    debug!(
        "Pipe finished: {} lines, {} intervals ({} incomplete), {} errors",
        summary.lines, summary.emitted, summary.incomplete, summary.errors
    );
    Ok(summary)
}

/// Spawns [`run_pipe_task`] and returns the handle feeding it.
pub fn spawn_pipe<S>(
    pipe: StreamingPipe,
    sink: S,
    cancel: CancellationToken,
) -> (PipeHandle, JoinHandle<Result<PipeSummary>>)
where
    S: BandwidthSink + 'static,
{
    let (handle, receiver) = PipeHandle::new();
    let task = tokio::spawn(run_pipe_task(receiver, pipe, sink, cancel));
    (handle, task)
}

fn deliver<S: BandwidthSink>(
    sink: &mut S,
    reports: Vec<IntervalReport>,
    summary: &mut PipeSummary,
) -> Result<()> {
    for report in reports {
        summary.emitted += 1;
        if !report.complete {
            summary.incomplete += 1;
        }
        sink.on_interval(report)?;
    }
    Ok(())
}
