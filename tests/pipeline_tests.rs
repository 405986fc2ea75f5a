use std::io::Cursor;
use std::sync::Arc;

use tickscore::mlp::{HIDDEN, INPUTS, MlpWeights, ReloadCounts, Scales, infer};
use tickscore::wire::{
    Action, DeltaRecord, MsgType, PacketFramer, PacketHeader, Side, decode_features,
    decode_response, encode_deltas_packet, encode_features,
};
use tickscore::{
    OutputMode, PipelineConfig, PipelineDriver, PipelineError, WeightStore, WireError,
};

fn clock() -> u64 {
    7
}

fn driver(output: OutputMode, weights: Arc<WeightStore>) -> PipelineDriver {
    let config = PipelineConfig {
        output,
        ..Default::default()
    };
    PipelineDriver::new(&config, weights).with_clock(clock)
}

fn packet(seq: u32, t_ns: u64, records: &[DeltaRecord]) -> Vec<u8> {
    let mut buf = Vec::new();
    let header = PacketHeader::deltas(seq, t_ns, records.len() as u16, false);
    encode_deltas_packet(&header, records, &mut buf);
    buf
}

fn model() -> MlpWeights {
    let mut w = MlpWeights {
        b1: -100,
        scales: Scales {
            in_scale: 1.0,
            w0_scale: 0.5,
            act0_scale: 0.25,
            w1_scale: 0.5,
        },
        ..Default::default()
    };
    for h in 0..HIDDEN {
        w.w0[h] = [1, 2, -1, 0];
        w.b0[h] = h as i32 - 16;
        w.w1[h] = if h % 2 == 0 { 1 } else { -1 };
    }
    w
}

#[test]
fn test_ofi_ignores_set_and_remove() {
    let mut d = driver(OutputMode::Features, Arc::new(WeightStore::default()));
    let records = [
        DeltaRecord::new(Side::Bid, Action::Add, 0, 100, 40),
        DeltaRecord::new(Side::Ask, Action::Update, 0, 101, 15),
        DeltaRecord::new(Side::Bid, Action::Set, 1, 99, 500),
        DeltaRecord::new(Side::Ask, Action::Remove, 0, 101, 999),
    ];
    let out = d.process_packet(&packet(1, 1_000, &records)).unwrap();
    assert_eq!(out.features.ofi_q32, 25);
    assert_eq!(d.book().ask.qty[0], 0);
    assert_eq!(d.book().bid.qty[1], 500);
}

#[test]
fn test_imbalance_boundaries() {
    let mut d = driver(OutputMode::Features, Arc::new(WeightStore::default()));
    let empty = d.process_packet(&packet(1, 1_000, &[])).unwrap();
    assert_eq!(empty.features.tob_imb_q1_15, 0);

    let bid_only = [DeltaRecord::new(Side::Bid, Action::Set, 0, 100, 100)];
    let out = d.process_packet(&packet(2, 2_000, &bid_only)).unwrap();
    assert_eq!(out.features.tob_imb_q1_15, 32767);
}

#[test]
fn test_quantities_never_negative() {
    let mut d = driver(OutputMode::Features, Arc::new(WeightStore::default()));
    let records = [
        DeltaRecord::new(Side::Bid, Action::Set, 0, 100, 5),
        DeltaRecord::new(Side::Bid, Action::Update, 0, 100, -50),
        DeltaRecord::new(Side::Ask, Action::Set, 2, 104, -3),
    ];
    d.process_packet(&packet(1, 1_000, &records)).unwrap();
    let book = d.book();
    assert!(book.bid.qty.iter().chain(book.ask.qty.iter()).all(|q| *q >= 0));
    assert_eq!(book.bid.qty[0], 0);
}

#[test]
fn test_out_of_range_level_counts_for_ofi_only() {
    let mut d = driver(OutputMode::Features, Arc::new(WeightStore::default()));
    let records = [DeltaRecord::new(Side::Bid, Action::Add, 16, 100, 9)];
    let out = d.process_packet(&packet(1, 1_000, &records)).unwrap();
    assert_eq!(out.features.ofi_q32, 9);
    assert!(d.book().bid.qty.iter().all(|q| *q == 0));
    assert!(d.book().bid.price.iter().all(|p| *p == 0));
}

#[test]
fn test_reload_then_bit_exact_score() {
    let store = Arc::new(WeightStore::default());
    let mut d = driver(OutputMode::FeatScore, store.clone());
    let target = model();
    store.set_scales(target.scales);

    let words = target.reload_words();
    assert_eq!(words.len(), ReloadCounts::FULL.total_words());
    let report = d
        .reload_weights(&mut words.into_iter(), ReloadCounts::FULL)
        .unwrap();
    assert_eq!(report.elements_loaded, 193);
    assert_eq!(d.stats().outputs, 0);
    assert_eq!(store.snapshot(), target);

    let quotes = [
        DeltaRecord::new(Side::Bid, Action::Set, 0, 1000, 0),
        DeltaRecord::new(Side::Ask, Action::Set, 0, 1004, 0),
        DeltaRecord::new(Side::Bid, Action::Add, 0, 1000, 30),
        DeltaRecord::new(Side::Ask, Action::Add, 0, 1004, 10),
    ];
    d.process_packet(&packet(1, 1_000, &quotes)).unwrap();
    let moved = [DeltaRecord::new(Side::Bid, Action::Set, 0, 1010, 30)];
    let out = d.process_packet(&packet(2, 201_000, &moved)).unwrap();

    assert_eq!(out.features.ofi_q32, 20);
    assert_eq!(out.features.tob_imb_q1_15, 16384);
    assert_eq!(out.features.burst_q16_16, 65536);
    assert_eq!(out.features.vol_q16_16, 32768);
    // x quantizes to [20, 1, 1, 1], hidden y = 2h + 10, logit -132 * 0.125.
    assert_eq!(out.score.score_q16_16, -1_081_344);
    assert_eq!(out.score, infer(&out.features, &target));

    let (features, score) = match decode_response(&out.to_bytes()) {
        Ok(decoded) => (decoded.features, decoded.score),
        Err(e) => panic!("reply did not decode: {e}"),
    };
    assert_eq!(features, out.features);
    assert_eq!(score, out.score);
}

#[test]
fn test_reload_underrun_keeps_previous_weights() {
    let store = Arc::new(WeightStore::new(model()));
    let mut d = driver(OutputMode::FeatScore, store.clone());

    let replacement = MlpWeights::default().reload_words();
    let mut short = replacement.into_iter().take(INPUTS * HIDDEN / 4);
    let err = d.reload_weights(&mut short, ReloadCounts::FULL).unwrap_err();
    assert!(matches!(err, PipelineError::Reload(_)));
    assert_eq!(store.snapshot(), model());
}

#[test]
fn test_feature_payload_roundtrip() {
    let mut d = driver(OutputMode::Features, Arc::new(WeightStore::default()));
    let records = [
        DeltaRecord::new(Side::Bid, Action::Set, 0, 1000, 3),
        DeltaRecord::new(Side::Ask, Action::Set, 0, 1010, 70),
    ];
    d.process_packet(&packet(1, 500, &records)).unwrap();
    let moved = [DeltaRecord::new(Side::Bid, Action::Set, 0, 1004, 3)];
    let out = d.process_packet(&packet(2, 90_000, &moved)).unwrap();
    assert_eq!(out.features.vol_q16_16, 5865);
    assert_eq!(decode_features(&encode_features(&out.features)).unwrap(), out.features);
}

#[test]
fn test_capture_replay_through_framer() {
    let mut capture = Vec::new();
    let quotes = [
        DeltaRecord::new(Side::Bid, Action::Set, 0, 1000, 10),
        DeltaRecord::new(Side::Ask, Action::Set, 0, 1001, 10),
    ];
    capture.extend_from_slice(&packet(1, 1_000, &quotes));
    capture.extend_from_slice(&PacketHeader::ping(2, 2_000).encode());
    // Bid lifts to 1003 and the mid moves by 2 ticks.
    let flood: Vec<_> = std::iter::once(DeltaRecord::new(Side::Bid, Action::Set, 0, 1003, 10))
        .chain((1..150).map(|_| DeltaRecord::new(Side::Bid, Action::Add, 0, 1003, 1)))
        .collect();
    capture.extend_from_slice(&packet(3, 3_000, &flood));
    capture.extend_from_slice(&packet(4, 4_000, &[]));

    let mut d = driver(OutputMode::Timing, Arc::new(WeightStore::default()));
    let mut framer = PacketFramer::new(Cursor::new(capture));
    let mut replies = Vec::new();
    while let Some(frame) = framer.next_frame().unwrap() {
        let out = d.process_packet(frame).unwrap();
        replies.push(decode_response(&out.to_bytes()).unwrap());
    }

    assert_eq!(framer.frames(), 4);
    let kinds: Vec<_> = replies.iter().map(|r| r.kind().unwrap()).collect();
    assert_eq!(
        kinds,
        vec![
            MsgType::FeaturesWithTiming,
            MsgType::Ping,
            MsgType::FeaturesWithTiming,
            MsgType::FeaturesWithTiming
        ]
    );
    assert_eq!(replies[0].features.vol_q16_16, 0);
    assert_eq!(replies[2].features.ofi_q32, 127);
    assert_eq!(replies[2].features.vol_q16_16, 131);
    assert_eq!(replies[3].features.vol_q16_16, 131);
    assert_eq!(replies[3].header.seq, 4);
    assert_eq!(replies[3].timing.rx_ns, 7);
    assert_eq!(d.stats().oversized, 1);
}

#[test]
fn test_bad_magic_is_dropped() {
    let mut d = driver(OutputMode::FeatScore, Arc::new(WeightStore::default()));
    let mut bytes = packet(1, 1_000, &[]);
    bytes[0] = b'X';
    assert!(matches!(
        d.process_packet(&bytes),
        Err(PipelineError::Wire(WireError::BadMagic(_)))
    ));
    assert_eq!(d.stats().outputs, 0);
    assert_eq!(d.stats().malformed, 1);
}
