use crate::error::WireError;
use crate::features::FeatureSnapshot;
use crate::mlp::ScoreOutput;
use crate::wire::header::{be_u16, be_u32, be_u64};
use bytemuck::{Pod, Zeroable};

pub const FEATURES_LEN: usize = 16;
pub const FEATURE_SCORE_LEN: usize = 20;
pub const TIMING_LEN: usize = 40;

fn ensure(buf: &[u8], needed: usize) -> Result<(), WireError> {
    if buf.len() < needed {
        return Err(WireError::MalformedPacket {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

pub fn encode_features(snapshot: &FeatureSnapshot) -> [u8; FEATURES_LEN] {
    let mut out = [0u8; FEATURES_LEN];
    out[0..4].copy_from_slice(&snapshot.ofi_q32.to_be_bytes());
    out[4..6].copy_from_slice(&snapshot.tob_imb_q1_15.to_be_bytes());
    out[6..8].copy_from_slice(&snapshot.rsv0.to_be_bytes());
    out[8..12].copy_from_slice(&snapshot.burst_q16_16.to_be_bytes());
    out[12..16].copy_from_slice(&snapshot.vol_q16_16.to_be_bytes());
    out
}

pub fn decode_features(buf: &[u8]) -> Result<FeatureSnapshot, WireError> {
    ensure(buf, FEATURES_LEN)?;
    Ok(FeatureSnapshot {
        ofi_q32: be_u32(buf, 0) as i32,
        tob_imb_q1_15: be_u16(buf, 4) as i16,
        rsv0: be_u16(buf, 6),
        burst_q16_16: be_u32(buf, 8),
        vol_q16_16: be_u32(buf, 12),
    })
}

pub fn encode_feature_score(snapshot: &FeatureSnapshot, score: &ScoreOutput) -> [u8; FEATURE_SCORE_LEN] {
    let mut out = [0u8; FEATURE_SCORE_LEN];
    out[..FEATURES_LEN].copy_from_slice(&encode_features(snapshot));
    out[FEATURES_LEN..].copy_from_slice(&score.score_q16_16.to_be_bytes());
    out
}

pub fn decode_feature_score(buf: &[u8]) -> Result<(FeatureSnapshot, ScoreOutput), WireError> {
    ensure(buf, FEATURE_SCORE_LEN)?;
    let snapshot = decode_features(buf)?;
    let score = ScoreOutput {
        score_q16_16: be_u32(buf, FEATURES_LEN) as i32,
    };
    Ok((snapshot, score))
}

/// Per-stage timestamps appended to a FEATURES_WITH_TIMING reply.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TimingTrailer {
    pub rx_ns: u64,
    pub dispatch_ns: u64,
    pub features_ns: u64,
    pub score_ns: u64,
    pub tx_ns: u64,
}

impl TimingTrailer {
    pub fn encode(&self) -> [u8; TIMING_LEN] {
        let mut out = [0u8; TIMING_LEN];
        let stamps = [self.rx_ns, self.dispatch_ns, self.features_ns, self.score_ns, self.tx_ns];
        for (chunk, stamp) in out.chunks_exact_mut(8).zip(stamps) {
            chunk.copy_from_slice(&stamp.to_be_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        ensure(buf, TIMING_LEN)?;
        Ok(Self {
            rx_ns: be_u64(buf, 0),
            dispatch_ns: be_u64(buf, 8),
            features_ns: be_u64(buf, 16),
            score_ns: be_u64(buf, 24),
            tx_ns: be_u64(buf, 32),
        })
    }
}
