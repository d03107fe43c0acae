mod synth;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info, warn};
use pulse_lib::{EcgSample, EcgSession, SessionConfig, Snapshot};
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};
use synth::{synthesize, SynthParams};

#[derive(Parser)]
#[command(
    name = "pulse",
    version,
    about = "Pulse: live ECG peaks, HRV and ECG-derived respiration"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SessionArgs {
    /// TOML session configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the sampling rate (Hz)
    #[arg(long)]
    fs: Option<f64>,
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Samples pushed into the session per recompute
    #[arg(long, default_value_t = 250)]
    batch: usize,
    /// Print only the snapshot after the last batch
    #[arg(long)]
    final_only: bool,
    /// Print a session summary after the snapshots
    #[arg(long)]
    summary: bool,
    /// Include the reconstructed respiration waveform in each snapshot
    #[arg(long)]
    signal: bool,
    /// After each snapshot, print the chart view (last `view_len` samples with peaks)
    #[arg(long)]
    view: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream `timestamp_ms,value` CSV rows from stdin or --input through a session
    Stream {
        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        output: OutputArgs,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Stream a synthetic ECG through a session
    Simulate {
        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        output: OutputArgs,
        #[arg(long, default_value_t = 60.0)]
        duration_s: f64,
        #[arg(long, default_value_t = 72.0)]
        heart_rate: f64,
        #[arg(long, default_value_t = 0.0)]
        rr_jitter_ms: f64,
        /// Breaths per minute
        #[arg(long, default_value_t = 15.0)]
        resp_rate: f64,
        #[arg(long, default_value_t = 0.2)]
        resp_depth: f64,
        #[arg(long, default_value_t = 0.01)]
        noise: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Print the effective session configuration as TOML
    Config {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line<'a> {
    Snapshot(&'a Snapshot),
    Summary(&'a pulse_lib::SessionSummary),
    View(&'a pulse_lib::WindowView),
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Stream {
            session,
            output,
            input,
        } => cmd_stream(&session, &output, input.as_deref())?,
        Commands::Simulate {
            session,
            output,
            duration_s,
            heart_rate,
            rr_jitter_ms,
            resp_rate,
            resp_depth,
            noise,
            seed,
        } => {
            let config = load_config(&session)?;
            let params = SynthParams {
                fs: config.sampling_rate_hz,
                duration_s,
                heart_rate_bpm: heart_rate,
                rr_jitter_ms,
                resp_rate_bpm: resp_rate,
                resp_depth,
                noise,
                seed,
                start_ms: 0,
            };
            cmd_simulate(config, &output, &params)?
        }
        Commands::Config { session } => {
            let config = load_config(&session)?;
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}

fn load_config(args: &SessionArgs) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(fs) = args.fs {
        config.sampling_rate_hz = fs;
    }
    config.validate()?;
    Ok(config)
}

/// Feeds batches into a session and writes JSON lines.
struct Runner<W: Write> {
    session: EcgSession,
    output: OutputArgs,
    out: W,
    last: Option<Snapshot>,
}

impl<W: Write> Runner<W> {
    fn new(config: SessionConfig, output: &OutputArgs, out: W) -> Result<Self> {
        if output.batch == 0 {
            bail!("--batch must be at least 1");
        }
        Ok(Self {
            session: EcgSession::new(config)?,
            output: output.clone(),
            out,
            last: None,
        })
    }

    fn push(&mut self, batch: &[EcgSample]) -> Result<()> {
        let mut snapshot = self.session.push_samples(batch);
        if !self.output.signal {
            snapshot.respiration_signal.clear();
        }
        if !self.output.final_only {
            self.emit_snapshot(&snapshot)?;
        }
        self.last = Some(snapshot);
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        let last = self.last.take().unwrap_or_default();
        if self.output.final_only {
            self.emit_snapshot(&last)?;
        }
        if self.output.summary {
            let summary = self.session.summary(&last);
            info!(
                "session: {:.1} s, {} samples ({} rejected)",
                summary.duration_s, summary.samples_received, summary.samples_rejected
            );
            self.emit(&Line::Summary(&summary))?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn emit_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.emit(&Line::Snapshot(snapshot))?;
        if self.output.view {
            let view = self.session.chart_view(snapshot);
            self.emit(&Line::View(&view))?;
        }
        Ok(())
    }

    fn emit(&mut self, line: &Line) -> Result<()> {
        serde_json::to_writer(&mut self.out, line)?;
        writeln!(self.out)?;
        Ok(())
    }
}

fn cmd_stream(args: &SessionArgs, output: &OutputArgs, input: Option<&Path>) -> Result<()> {
    let config = load_config(args)?;
    let reader: Box<dyn Read> = match input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("opening samples {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };
    let stdout = io::stdout();
    let mut runner = Runner::new(config, output, BufWriter::new(stdout.lock()))?;

    let mut csv = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(reader);
    let mut batch = Vec::with_capacity(output.batch);
    let mut record = StringRecord::new();
    let mut row = 0usize;
    while csv
        .read_record(&mut record)
        .with_context(|| format!("reading sample row {}", row + 1))?
    {
        row += 1;
        match parse_sample(&record) {
            Some(sample) => batch.push(sample),
            None if row == 1 => {
                debug!("skipping header row {:?}", record);
                continue;
            }
            None => {
                warn!("skipping malformed row {}: {:?}", row, record);
                continue;
            }
        }
        if batch.len() == output.batch {
            runner.push(&batch)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        runner.push(&batch)?;
    }
    runner.finish()
}

fn parse_sample(record: &StringRecord) -> Option<EcgSample> {
    let timestamp_ms = record.get(0)?.parse::<i64>().ok()?;
    let value = record.get(1)?.parse::<f64>().ok()?;
    value.is_finite().then(|| EcgSample::new(timestamp_ms, value))
}

fn cmd_simulate(config: SessionConfig, output: &OutputArgs, params: &SynthParams) -> Result<()> {
    if !(params.duration_s > 0.0 && params.heart_rate_bpm > 0.0) {
        bail!("--duration-s and --heart-rate must be positive");
    }
    let samples = synthesize(params);
    info!(
        "simulating {} samples at {} Hz ({} bpm, {} breaths/min)",
        samples.len(),
        params.fs,
        params.heart_rate_bpm,
        params.resp_rate_bpm
    );
    let stdout = io::stdout();
    let mut runner = Runner::new(config, output, BufWriter::new(stdout.lock()))?;
    for chunk in samples.chunks(output.batch) {
        runner.push(chunk)?;
    }
    runner.finish()
}
