use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use iperf_parse::lines::{read_lossy_line, LossyLines};
use iperf_parse::parser::csv_filename;
use iperf_parse::pipe::{spawn_pipe, StreamingPipe};
use iperf_parse::stages::{Broadcast, FileOutput, LineOutput, SinkStage, Stage};
use iperf_parse::{
    BandwidthParser, IntervalBandwidth, IperfParser, ParserConfig, SumParser, ToleranceMode, Unit,
};
use log::info;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "iperf-parse")]
#[command(about = "Extract bandwidth figures from iperf output", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ParserArgs {
    /// Number of parallel iperf threads
    #[arg(short = 'P', long, default_value = "4")]
    threads: usize,

    /// Units to report in (bits, Kbits, Mbits, Gbits, Bytes, KBytes, MBytes, GBytes)
    #[arg(short = 'f', long, default_value = "Mbits")]
    units: String,

    /// Seconds between iperf reports
    #[arg(short, long, default_value = "1")]
    interval: f64,

    /// Seconds an interval may run over before it is discarded
    #[arg(long, default_value = "0.1")]
    tolerance: f64,

    /// Discard intervals that run short as well as long
    #[arg(long)]
    absolute: bool,

    /// Largest believable bandwidth in the output units; larger values become 0
    #[arg(long, default_value = "1000000000")]
    maximum: f64,

    /// Use iperf's [SUM] rows instead of adding up the threads
    #[arg(long)]
    sum: bool,
}

impl ParserArgs {
    fn config(&self) -> anyhow::Result<ParserConfig> {
        let units: Unit = self.units.parse()?;
        let mode = if self.absolute {
            ToleranceMode::Absolute
        } else {
            ToleranceMode::OneSided
        };
        Ok(ParserConfig::new()
            .with_threads(self.threads)
            .with_units(units)
            .with_expected_interval(self.interval)
            .with_interval_tolerance(self.tolerance)
            .with_tolerance_mode(mode)
            .with_maximum(self.maximum))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a finished iperf capture
    Parse {
        /// Capture to read, or - for stdin
        #[arg(default_value = "-")]
        input: String,

        #[command(flatten)]
        parser: ParserArgs,

        /// Output in JSON format
        #[arg(short = 'J', long)]
        json: bool,

        /// Also write the totals to a .csv file next to the capture
        #[arg(long)]
        save: bool,
    },

    /// Follow live iperf output on stdin
    Watch {
        #[command(flatten)]
        parser: ParserArgs,

        /// Seconds to wait for every thread before reporting a partial interval
        #[arg(long, default_value = "5")]
        timeout: f64,
    },
}

fn parse_capture(input: &str, args: &ParserArgs, json: bool, save: bool) -> anyhow::Result<()> {
    if save && input == "-" {
        bail!("--save needs a capture file, not stdin");
    }
    let config = args.config()?;
    let mut parser: Box<dyn BandwidthParser> = if args.sum {
        Box::new(SumParser::new(config)?.with_emit(false))
    } else {
        Box::new(IperfParser::new(config)?)
    };

    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(input).with_context(|| format!("failed to open {input}"))?;
        Box::new(BufReader::new(file))
    };

    for (number, line) in LossyLines::new(reader).enumerate() {
        let line = line?;
        parser
            .process(&line)
            .with_context(|| format!("line {}: {}", number + 1, line.trim_end()))?;
    }

    let totals: Vec<IntervalBandwidth> = parser.bandwidths().collect();
    info!(
        "{} intervals in {} format",
        totals.len(),
        parser
            .format()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no".to_string())
    );

    let mut targets: Vec<Box<dyn Stage>> = Vec::new();
    if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
    } else {
        targets.push(Box::new(LineOutput::new(io::stdout())));
    }
    if save {
        let path = csv_filename(input);
        info!("Writing totals to {}", path);
        targets.push(Box::new(FileOutput::create(&path)?));
    }

    let mut output = Broadcast::new(targets);
    for total in &totals {
        output.send(&format!("{},{}", total.start, total.bandwidth))?;
    }
    Ok(())
}

async fn watch(args: &ParserArgs, timeout: f64) -> anyhow::Result<()> {
    let config = args
        .config()?
        .with_quorum_timeout(Duration::try_from_secs_f64(timeout)?);
    let pipe = if args.sum {
        StreamingPipe::sum(config)?
    } else {
        StreamingPipe::threads(config)?
    };

    let cancel = CancellationToken::new();
    let sink = SinkStage::new(LineOutput::new(io::stdout()));
    let (handle, task) = spawn_pipe(pipe, sink, cancel.clone());

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut buffer = Vec::new();
    loop {
        tokio::select! {
            line = read_lossy_line(&mut stdin, &mut buffer) => match line? {
                Some(line) => {
                    if handle.line(line).is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                break;
            }
        }
    }

    // the task may already be gone after a cancel
    let _ = handle.complete();
    let summary = task.await??;
    info!(
        "{} lines, {} intervals ({} incomplete), {} unparseable rows",
        summary.lines, summary.emitted, summary.incomplete, summary.errors
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            input,
            parser,
            json,
            save,
        } => parse_capture(&input, &parser, json, save)?,

        Commands::Watch { parser, timeout } => watch(&parser, timeout).await?,
    }

    Ok(())
}
