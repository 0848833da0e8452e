// Live-feed tests for the streaming pipe and its async task

use iperf_parse::pipe::{
    run_pipe_task, spawn_pipe, IntervalCollector, IntervalReport, PipeHandle, StreamingPipe,
};
use iperf_parse::stages::{LineOutput, SinkStage, Stage};
use iperf_parse::{ParserConfig, Result};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Writer whose contents can be read while a task owns a clone
#[derive(Clone, Default)]
struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    fn text(&self) -> String {
        String::from_utf8(self.bytes.lock().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn row(thread: u32, start: f64, bandwidth: f64) -> String {
    format!(
        "[{:3}] {:4.1}-{:4.1} sec  11.2 MBytes  {} Mbits/sec",
        thread,
        start,
        start + 1.0,
        bandwidth
    )
}

fn config(threads: usize, timeout: Duration) -> ParserConfig {
    ParserConfig::new()
        .with_threads(threads)
        .with_quorum_timeout(timeout)
}

#[test]
fn test_dropped_row_does_not_desync_later_intervals() {
    let mut pipe = StreamingPipe::threads(config(3, Duration::from_secs(2))).unwrap();
    let start = Instant::now();
    let mut reports: Vec<IntervalReport> = Vec::new();

    // thread 5's row for 0.0 is lost
    for line in [
        row(3, 0.0, 10.0),
        row(4, 0.0, 10.0),
        row(3, 1.0, 20.0),
        row(4, 1.0, 20.0),
        row(5, 1.0, 20.0),
        row(3, 2.0, 30.0),
        row(5, 2.0, 30.0),
        row(4, 2.0, 30.0),
    ] {
        reports.extend(pipe.push_at(&line, start).unwrap());
    }
    assert!(reports.is_empty());
    assert_eq!(pipe.pending(), 3);

    reports.extend(pipe.expire(start + Duration::from_secs(2)));
    let summary: Vec<(f64, f64, bool)> = reports
        .iter()
        .map(|r| (r.start, r.bandwidth, r.complete))
        .collect();
    assert_eq!(
        summary,
        vec![(0.0, 20.0, false), (1.0, 60.0, true), (2.0, 90.0, true)]
    );
}

#[test]
fn test_csv_live_feed() {
    let mut pipe = StreamingPipe::threads(config(2, Duration::from_secs(5))).unwrap();
    let lines = [
        "20120518130524,10.0.0.2,43171,10.0.0.1,5001,4,0.0-1.0,58720256,469762048",
        "20120518130524,10.0.0.2,43170,10.0.0.1,5001,3,0.0-1.0,58982400,471859200",
        "20120518130524,10.0.0.2,0,10.0.0.1,5001,-1,0.0-1.0,117702656,941621248",
    ];
    let reports: Vec<IntervalReport> = lines
        .iter()
        .flat_map(|line| pipe.push(line).unwrap())
        .collect();
    assert_eq!(reports.len(), 1);
    assert!((reports[0].bandwidth - 941.621248).abs() < 1e-9);
    assert_eq!(reports[0].threads, 2);
}

#[tokio::test]
async fn test_task_times_out_stuck_interval() {
    let collector = IntervalCollector::new();
    let pipe = StreamingPipe::threads(config(2, Duration::from_millis(100))).unwrap();
    let cancel = CancellationToken::new();
    let (handle, task) = spawn_pipe(pipe, collector.clone(), cancel.clone());

    handle.line(row(3, 0.0, 5.0)).unwrap();
    sleep(Duration::from_millis(400)).await;

    let reports = collector.reports();
    assert_eq!(reports.len(), 1, "stuck interval should have timed out");
    assert_eq!(reports[0].bandwidth, 5.0);
    assert!(!reports[0].complete);

    handle.complete().unwrap();
    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.emitted, 1);
    assert_eq!(summary.incomplete, 1);
}

#[tokio::test]
async fn test_task_stops_on_cancel() {
    let collector = IntervalCollector::new();
    let pipe = StreamingPipe::threads(config(2, Duration::from_secs(60))).unwrap();
    let cancel = CancellationToken::new();
    let (handle, task) = spawn_pipe(pipe, collector.clone(), cancel.clone());

    handle.line(row(3, 0.0, 1.0)).unwrap();
    handle.line(row(4, 0.0, 2.0)).unwrap();
    handle.line(row(3, 1.0, 7.0)).unwrap();
    sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.lines, 3);
    assert_eq!(collector.bandwidths(), vec![3.0, 7.0]);
    assert!(handle.line(row(4, 1.0, 1.0)).is_err());
}

#[tokio::test]
async fn test_task_flush_message() {
    let collector = IntervalCollector::new();
    let pipe = StreamingPipe::threads(config(4, Duration::from_secs(60))).unwrap();
    let (handle, receiver) = PipeHandle::new();
    let task = tokio::spawn(run_pipe_task(
        receiver,
        pipe,
        collector.clone(),
        CancellationToken::new(),
    ));

    handle.line(row(3, 0.0, 1.0)).unwrap();
    handle.flush().unwrap();
    handle.line(row(4, 0.0, 1.0)).unwrap();
    handle.line(row(3, 1.0, 2.0)).unwrap();
    drop(handle);

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.lines, 3);
    // the late 0.0 row is dropped, 1.0 is flushed when the handle goes away
    assert_eq!(collector.bandwidths(), vec![1.0, 2.0]);
    assert_eq!(summary.incomplete, 2);
}

#[tokio::test]
async fn test_task_counts_unparseable_rows() {
    let collector = IntervalCollector::new();
    let pipe = StreamingPipe::threads(config(1, Duration::from_secs(60))).unwrap();
    let (handle, task) = spawn_pipe(pipe, collector.clone(), CancellationToken::new());

    handle.line("[  3]  0.0- 1.0 sec  11.2 MBytes  9.4.1 Mbits/sec").unwrap();
    handle.line(row(3, 1.0, 94.0)).unwrap();
    handle.complete().unwrap();

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(collector.bandwidths(), vec![94.0]);
}

#[tokio::test]
async fn test_task_writes_through_stages() {
    let buffer = SharedBuffer::default();
    let sink = SinkStage::new(LineOutput::new(buffer.clone()));
    let pipe = StreamingPipe::sum(config(2, Duration::from_secs(60))).unwrap();
    let (handle, task) = spawn_pipe(pipe, sink, CancellationToken::new());

    for line in [
        row(3, 0.0, 470.0),
        row(4, 0.0, 471.0),
        "[SUM]  0.0- 1.0 sec   112 MBytes   941 Mbits/sec".to_string(),
        "[SUM]  1.0- 2.0 sec   112 MBytes   940 Mbits/sec".to_string(),
    ] {
        handle.line(line).unwrap();
    }
    handle.complete().unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(buffer.text(), "0,941\n1,940\n");
}

/// Stage whose writes always fail
struct BrokenStage;

impl Stage for BrokenStage {
    fn send(&mut self, _line: &str) -> Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed").into())
    }
}

#[tokio::test]
async fn test_sink_failure_ends_task() {
    let pipe = StreamingPipe::threads(config(1, Duration::from_secs(60))).unwrap();
    let (handle, task) = spawn_pipe(pipe, SinkStage::new(BrokenStage), CancellationToken::new());

    handle.line(row(3, 0.0, 1.0)).unwrap();
    let result = task.await.unwrap();
    assert!(result.is_err());
}
