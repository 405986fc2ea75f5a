use crate::book::BookState;
use crate::config::{OutputMode, PipelineConfig};
use crate::error::PipelineError;
use crate::features::FeatureEngine;
use crate::measure::wall_clock_ns;
use crate::mlp::{ReloadCounts, ReloadReport, WeightStore, WordSource, infer};
use crate::stage::{OutputCollector, Stage};
use crate::wire::{DeltaBatch, MAX_DELTAS_PER_PACKET, MsgType, PipelineOutput, decode_packet};
use spdlog::{debug, warn};
use std::sync::Arc;

/// Counters kept across the lifetime of a driver. Never reset by a book reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub packets: u64,
    pub pings: u64,
    pub resets: u64,
    pub deltas: u64,
    pub outputs: u64,
    pub malformed: u64,
    /// DELTAS packets that declared more records than are materialized.
    pub oversized: u64,
    pub reloads: u64,
    pub reload_failures: u64,
}

/// Sequential packet processor: one book, one set of feature accumulators,
/// one shared weight store.
///
/// Every accepted packet yields exactly one [`PipelineOutput`]. Malformed packets
/// yield an error and leave all state untouched.
pub struct PipelineDriver {
    output: OutputMode,
    book: BookState,
    features: FeatureEngine,
    weights: Arc<WeightStore>,
    clock: fn() -> u64,
    stats: DriverStats,
}

impl PipelineDriver {
    pub fn new(config: &PipelineConfig, weights: Arc<WeightStore>) -> Self {
        Self {
            output: config.output,
            book: BookState::new(),
            features: FeatureEngine::new(config.feature_params),
            weights,
            clock: wall_clock_ns,
            stats: DriverStats::default(),
        }
    }

    /// Replaces the clock used for `t_ingress_ns` and timing stamps.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn process_packet(&mut self, packet: &[u8]) -> Result<PipelineOutput, PipelineError> {
        match decode_packet(packet) {
            Ok(batch) => Ok(self.process_batch(&batch)),
            Err(e) => {
                self.stats.malformed += 1;
                warn!("dropping packet ({} bytes): {}", packet.len(), e);
                Err(e.into())
            }
        }
    }

    pub fn process_batch(&mut self, batch: &DeltaBatch) -> PipelineOutput {
        let rx_ns = (self.clock)();
        let timed = self.output == OutputMode::Timing;
        self.stats.packets += 1;

        if batch.is_ping() {
            self.stats.pings += 1;
            return PipelineOutput {
                header: batch.header.reply(MsgType::Ping, rx_ns),
                ..Default::default()
            };
        }

        if batch.header.is_reset() {
            self.reset();
            self.stats.resets += 1;
            debug!("reset requested by packet seq {}", batch.header.seq);
        }
        if batch.declared_count as usize > MAX_DELTAS_PER_PACKET {
            self.stats.oversized += 1;
        }

        let mut out = PipelineOutput {
            header: batch.header.reply(self.output.msg_type(), rx_ns),
            ..Default::default()
        };
        if timed {
            out.timing.rx_ns = rx_ns;
            out.timing.dispatch_ns = (self.clock)();
        }

        for event in batch.events() {
            self.book.apply(event);
            self.features.update_ofi(event);
        }
        self.stats.deltas += batch.count as u64;

        out.top = self.book.top();
        out.features = self.features.snapshot(batch.header.t_send_ns, &out.top);
        if timed {
            out.timing.features_ns = (self.clock)();
        }

        out.score = infer(&out.features, &self.weights.load());
        if timed {
            out.timing.score_ns = (self.clock)();
            out.timing.tx_ns = (self.clock)();
        }

        self.stats.outputs += 1;
        out
    }

    /// Consumes one weight-reload sequence. Emits no output and does not touch book state.
    pub fn reload_weights<S: WordSource + ?Sized>(
        &mut self,
        source: &mut S,
        counts: ReloadCounts,
    ) -> Result<ReloadReport, PipelineError> {
        match self.weights.reload(source, counts) {
            Ok(report) => {
                self.stats.reloads += 1;
                Ok(report)
            }
            Err(e) => {
                self.stats.reload_failures += 1;
                Err(e.into())
            }
        }
    }

    /// Clears book and feature accumulators. Weights and counters are kept.
    pub fn reset(&mut self) {
        self.book.reset();
        self.features.reset();
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output
    }

    pub fn weights(&self) -> &Arc<WeightStore> {
        &self.weights
    }

    pub fn book(&self) -> &BookState {
        &self.book
    }

    pub fn features(&self) -> &FeatureEngine {
        &self.features
    }
}

impl Stage<DeltaBatch, PipelineOutput> for PipelineDriver {
    #[inline]
    fn process<C>(&mut self, data: &DeltaBatch, collector: &mut C)
    where
        C: OutputCollector<PipelineOutput>,
    {
        collector.push(&self.process_batch(data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireError;
    use crate::mlp::{MlpWeights, Scales};
    use crate::wire::{
        Action, DELTA_LEN, DeltaRecord, HEADER_LEN, PacketHeader, Side, decode_response,
        encode_deltas_packet,
    };

    fn fixed_clock() -> u64 {
        42
    }

    fn driver(output: OutputMode) -> PipelineDriver {
        let config = PipelineConfig {
            output,
            ..Default::default()
        };
        PipelineDriver::new(&config, Arc::new(WeightStore::default())).with_clock(fixed_clock)
    }

    fn packet(seq: u32, t_ns: u64, reset: bool, records: &[DeltaRecord]) -> Vec<u8> {
        let header = PacketHeader::deltas(seq, t_ns, records.len() as u16, reset);
        let mut buf = Vec::new();
        encode_deltas_packet(&header, records, &mut buf);
        buf
    }

    fn quotes() -> Vec<DeltaRecord> {
        vec![
            DeltaRecord::new(Side::Bid, Action::Set, 0, 1000, 0),
            DeltaRecord::new(Side::Ask, Action::Set, 0, 1002, 0),
            DeltaRecord::new(Side::Bid, Action::Add, 0, 1000, 30),
            DeltaRecord::new(Side::Ask, Action::Add, 0, 1002, 10),
        ]
    }

    #[test]
    fn test_one_output_per_batch() {
        let mut d = driver(OutputMode::Features);
        let out = d.process_packet(&packet(7, 1_000, false, &quotes())).unwrap();

        assert_eq!(out.kind().unwrap(), MsgType::Features);
        assert_eq!(out.header.seq, 7);
        assert_eq!(out.header.t_send_ns, 1_000);
        assert_eq!(out.header.t_ingress_ns, 42);
        assert_eq!(out.features.ofi_q32, 20);
        assert_eq!(out.features.tob_imb_q1_15, 16384);
        assert_eq!(out.top.bid_px, 1000);
        assert_eq!(out.top.ask_qty, 10);

        let s = d.stats();
        assert_eq!((s.packets, s.deltas, s.outputs), (1, 4, 1));
    }

    #[test]
    fn test_zero_delta_packet_still_scores() {
        let mut d = driver(OutputMode::FeatScore);
        let first = d.process_packet(&packet(1, 1_000, false, &quotes())).unwrap();
        assert_eq!(first.features.burst_q16_16, 65536);
        assert_eq!(first.features.vol_q16_16, 0);

        // Mid moves 1001 -> 1006 over 100us.
        let moved = [DeltaRecord::new(Side::Bid, Action::Set, 0, 1010, 30)];
        let second = d.process_packet(&packet(2, 101_000, false, &moved)).unwrap();
        assert_eq!(second.features.burst_q16_16, 98304);
        assert_eq!(second.features.vol_q16_16, 16384);

        let out = d.process_packet(&packet(3, 201_000, false, &[])).unwrap();
        assert_eq!(out.kind().unwrap(), MsgType::FeatScore);
        assert_eq!(out.features.ofi_q32, second.features.ofi_q32);
        assert_eq!(out.features.tob_imb_q1_15, second.features.tob_imb_q1_15);
        assert_eq!(out.features.burst_q16_16, 114688);
        assert_eq!(out.features.vol_q16_16, 15565);
        assert_eq!(d.stats().outputs, 3);
    }

    #[test]
    fn test_malformed_packet_leaves_state_untouched() {
        let mut d = driver(OutputMode::FeatScore);
        d.process_packet(&packet(1, 1_000, false, &quotes())).unwrap();
        let book = *d.book();
        let acc = *d.features().accumulators();

        let mut bad = packet(2, 2_000, false, &quotes());
        bad.truncate(40);
        assert!(matches!(
            d.process_packet(&bad),
            Err(PipelineError::Wire(WireError::MalformedPacket { .. }))
        ));

        assert_eq!(*d.book(), book);
        assert_eq!(*d.features().accumulators(), acc);
        assert_eq!(d.stats().malformed, 1);
        assert_eq!(d.stats().outputs, 1);
    }

    #[test]
    fn test_short_oversized_packet_is_rejected() {
        let mut d = driver(OutputMode::FeatScore);
        d.process_packet(&packet(1, 1_000, false, &quotes())).unwrap();
        let book = *d.book();
        let acc = *d.features().accumulators();

        let records: Vec<_> = (0..200)
            .map(|_| DeltaRecord::new(Side::Bid, Action::Add, 0, 1000, 1))
            .collect();
        let mut short = packet(2, 2_000, false, &records);
        short.truncate(HEADER_LEN + 130 * DELTA_LEN);
        assert!(matches!(
            d.process_packet(&short),
            Err(PipelineError::Wire(WireError::MalformedPacket { .. }))
        ));

        assert_eq!(*d.book(), book);
        assert_eq!(*d.features().accumulators(), acc);
        assert_eq!(d.stats().oversized, 0);
    }

    #[test]
    fn test_reset_flag_clears_before_applying() {
        let mut d = driver(OutputMode::Features);
        d.process_packet(&packet(1, 1_000, false, &quotes())).unwrap();

        let fresh = [
            DeltaRecord::new(Side::Ask, Action::Set, 0, 2000, 0),
            DeltaRecord::new(Side::Ask, Action::Update, 0, 2000, 4),
        ];
        let out = d.process_packet(&packet(2, 5_000, true, &fresh)).unwrap();

        assert_eq!(out.features.ofi_q32, -4);
        assert_eq!(out.top.bid_qty, 0);
        assert_eq!(out.top.ask_px, 2000);
        assert_eq!(out.features.burst_q16_16, 65536);
        assert_eq!(d.stats().resets, 1);
    }

    #[test]
    fn test_ping_echoes_and_keeps_state() {
        let mut d = driver(OutputMode::FeatScore);
        d.process_packet(&packet(1, 1_000, false, &quotes())).unwrap();
        let acc = *d.features().accumulators();

        let ping = PacketHeader::ping(9, 123).encode();
        let out = d.process_packet(&ping).unwrap();
        assert!(out.is_ping());
        assert_eq!(out.header.seq, 9);
        assert_eq!(out.header.t_send_ns, 123);
        assert_eq!(out.header.t_ingress_ns, 42);
        assert_eq!(out.to_bytes().len(), 32);
        assert_eq!(*d.features().accumulators(), acc);
        assert_eq!(d.stats().pings, 1);
    }

    #[test]
    fn test_timing_mode_stamps_trailer() {
        let mut d = driver(OutputMode::Timing);
        let out = d.process_packet(&packet(3, 1_000, false, &quotes())).unwrap();
        assert_eq!(out.timing.rx_ns, 42);
        assert_eq!(out.timing.tx_ns, 42);

        let decoded = decode_response(&out.to_bytes()).unwrap();
        assert_eq!(decoded.timing, out.timing);
        assert_eq!(decoded.features, out.features);
    }

    #[test]
    fn test_oversized_packet_counts_and_clamps() {
        let mut d = driver(OutputMode::Features);
        let records: Vec<_> = (0..200)
            .map(|_| DeltaRecord::new(Side::Bid, Action::Add, 0, 1000, 1))
            .collect();
        let out = d.process_packet(&packet(1, 1_000, false, &records)).unwrap();
        assert_eq!(out.features.ofi_q32, 128);
        assert_eq!(d.stats().oversized, 1);
        assert_eq!(d.stats().deltas, 128);
    }

    #[test]
    fn test_reload_changes_next_score_only() {
        let mut d = driver(OutputMode::FeatScore);
        let first = d.process_packet(&packet(1, 1_000, false, &quotes())).unwrap();
        assert_eq!(first.score.score_q16_16, 0);

        let mut next = MlpWeights {
            b1: 8,
            ..Default::default()
        };
        next.scales = Scales {
            act0_scale: 0.5,
            w1_scale: 0.25,
            ..Default::default()
        };
        d.weights().set_scales(next.scales);
        let words = next.reload_words();
        let report = d
            .reload_weights(&mut words.into_iter(), ReloadCounts::FULL)
            .unwrap();
        assert_eq!(report.elements_loaded, 193);
        assert_eq!(d.stats().outputs, 1);

        let second = d.process_packet(&packet(2, 2_000, false, &[])).unwrap();
        assert_eq!(second.score.score_q16_16, 65536);
        assert_eq!(d.stats().reloads, 1);
    }

    #[test]
    fn test_reload_underrun_is_counted() {
        let mut d = driver(OutputMode::FeatScore);
        let words = MlpWeights::default().reload_words();
        let mut short = words.into_iter().take(10);
        assert!(matches!(
            d.reload_weights(&mut short, ReloadCounts::FULL),
            Err(PipelineError::Reload(_))
        ));
        assert_eq!(d.stats().reload_failures, 1);
        assert_eq!(d.weights().version(), 0);
    }

    #[test]
    fn test_driver_as_stage() {
        let mut d = driver(OutputMode::Features);
        let batch = decode_packet(&packet(4, 1_000, false, &quotes())).unwrap();
        let mut seqs = Vec::new();
        d.process(&batch, &mut |o: &PipelineOutput| seqs.push(o.header.seq));
        assert_eq!(seqs, vec![4]);
    }
}
