use clap::Parser;
use spdlog::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tickscore::mlp::{BeWordReader, ModelManifest, ReloadCounts};
use tickscore::measure::LatencyMeasurer;
use tickscore::wire::{DeltaBatch, MsgType, decode_packet};
use tickscore::{
    DEFAULT_JOURNAL_CAPACITY, Decision, OutputMode, PacketFramer, PipelineConfig, PipelineDriver,
    PipelineOutput, Stage, StrategyStage, ThreadedPipeline, WeightStore, WorkerPool, latency,
    pipe, progress,
};

/// Replays a capture of concatenated LOB1 frames through the scoring pipeline.
#[derive(Parser)]
struct Args {
    /// Capture of concatenated LOB1 frames.
    #[arg(long)]
    input: PathBuf,

    /// Where the encoded replies are written, one per accepted frame.
    #[arg(long)]
    output: PathBuf,

    /// Quantized model manifest (mlp_int8.json). Without it all weights are zero.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Big-endian weight-reload stream applied after the manifest.
    #[arg(long)]
    reload: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputMode::FeatScore)]
    mode: OutputMode,

    /// Run the driver on its own worker thread.
    #[arg(long)]
    threaded: bool,

    /// Journal capacity in packets for the threaded pipeline. Replay stops once it is full.
    #[arg(long, default_value_t = DEFAULT_JOURNAL_CAPACITY)]
    capacity: usize,

    #[arg(long)]
    pin_cores: bool,

    #[arg(long)]
    latency_stats: bool,

    /// Log progress every N packets. 0 disables it.
    #[arg(long, default_value_t = 0)]
    progress: usize,
}

struct Tally {
    replies: u64,
    dropped: u64,
    decisions: [u64; 4],
    /// rx to tx as stamped by the driver, timing mode only.
    in_pipeline: LatencyMeasurer,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            replies: 0,
            dropped: 0,
            decisions: [0; 4],
            in_pipeline: LatencyMeasurer::new(1),
        }
    }
}

impl Tally {
    fn record(
        &mut self,
        strategy: &StrategyStage,
        out: &PipelineOutput,
        sink: &mut impl Write,
        buf: &mut Vec<u8>,
    ) -> std::io::Result<()> {
        buf.clear();
        out.encode_into(buf);
        sink.write_all(buf)?;
        self.replies += 1;
        if !out.is_ping() {
            self.decisions[strategy.evaluate(out).decision as usize] += 1;
        }
        if out.header.msg_type == MsgType::FeaturesWithTiming as u8 {
            self.in_pipeline.measure_span(out.timing.rx_ns, out.timing.tx_ns);
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = PipelineConfig {
        output: args.mode,
        journal_capacity: args.capacity,
        pin_cores: args.pin_cores,
        latency_stats: args.latency_stats,
        progress_interval: args.progress,
        ..Default::default()
    };

    info!("[Replay] Booting lob-replay, mode {:?}, threaded {}", config.output, args.threaded);

    let weights = Arc::new(WeightStore::default());
    if let Some(path) = &args.model {
        let manifest = ModelManifest::from_path(path)?;
        weights.replace(manifest.to_weights()?);
        info!("[Replay] Loaded model from {}", path.display());
    }

    let mut driver = PipelineDriver::new(&config, weights.clone());
    if let Some(path) = &args.reload {
        let mut words = BeWordReader::new(BufReader::new(File::open(path)?));
        driver.reload_weights(&mut words, ReloadCounts::FULL)?;
    }

    let mut framer = PacketFramer::new(BufReader::new(File::open(&args.input)?));
    let mut sink = BufWriter::new(File::create(&args.output)?);
    let strategy = StrategyStage::default();
    let mut tally = Tally::default();
    let mut buf = Vec::with_capacity(128);
    let report = match config.progress_interval {
        0 => usize::MAX,
        n => n,
    };
    let started = Instant::now();

    if args.threaded {
        let mut workers = WorkerPool::new();
        workers.set_pin_cores(config.pin_cores);
        workers.set_latency_stats(config.latency_stats);

        let pipeline =
            ThreadedPipeline::<DeltaBatch, DeltaBatch>::with_workers(workers, config.journal_capacity)?;
        let mut pipeline = pipeline.add_stage(pipe![
            progress("Driver", report),
            latency("Driver", report, 1000, driver)
        ])?;

        loop {
            if pipeline.is_full() {
                warn!(
                    "[Replay] Stopping, journal capacity {} reached (raise --capacity)",
                    pipeline.capacity()
                );
                break;
            }
            let frame = match framer.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("[Replay] Stopping, unreadable frame: {}", e);
                    break;
                }
            };
            match decode_packet(frame) {
                Ok(batch) => pipeline.send(&batch),
                Err(e) => {
                    tally.dropped += 1;
                    warn!("[Replay] Dropping frame: {}", e);
                }
            }
            while let Some(out) = pipeline.try_receive() {
                tally.record(&strategy, &out, &mut sink, &mut buf)?;
            }
        }

        let pending = pipeline.sent() as u64 - tally.replies;
        for _ in 0..pending {
            let out = pipeline.receive();
            tally.record(&strategy, &out, &mut sink, &mut buf)?;
        }
        pipeline.await_idle(Duration::from_millis(100));
    } else {
        let mut stage = pipe![
            progress("Driver", report),
            latency("Driver", report, 1000, driver)
        ];
        loop {
            let frame = match framer.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("[Replay] Stopping, unreadable frame: {}", e);
                    break;
                }
            };
            match decode_packet(frame) {
                Ok(batch) => {
                    let mut result = Ok(());
                    stage.process(&batch, &mut |out: &PipelineOutput| {
                        if result.is_ok() {
                            result = tally.record(&strategy, out, &mut sink, &mut buf);
                        }
                    });
                    result?;
                }
                Err(e) => {
                    tally.dropped += 1;
                    warn!("[Replay] Dropping frame: {}", e);
                }
            }
        }

        if config.latency_stats {
            info!("[Replay] Driver latency: {}", stage.second().measurer().format_stats());
        }
        let stats = stage.second().inner().stats();
        info!(
            "[Replay] Driver: {} packets, {} pings, {} resets, {} deltas, {} oversized",
            stats.packets, stats.pings, stats.resets, stats.deltas, stats.oversized
        );
    }

    sink.flush()?;

    let elapsed = started.elapsed();
    info!(
        "[Replay] {} frames ({} bytes) in {:?}, {} replies, {} dropped",
        framer.frames(),
        framer.bytes(),
        elapsed,
        tally.replies,
        tally.dropped
    );
    if config.output == OutputMode::Timing {
        info!("[Replay] In-pipeline latency: {}", tally.in_pipeline.format_stats());
    }
    for decision in Decision::ALL {
        info!("[Replay] {:?}: {}", decision, tally.decisions[decision as usize]);
    }
    info!("[Replay] Weights version {}", weights.version());
    info!("[Replay] Done!");

    Ok(())
}
