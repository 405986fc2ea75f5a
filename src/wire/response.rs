use crate::book::TopOfBook;
use crate::error::WireError;
use crate::features::FeatureSnapshot;
use crate::mlp::ScoreOutput;
use crate::wire::header::{HEADER_LEN, MsgType, PacketHeader};
use crate::wire::payload::{
    FEATURE_SCORE_LEN, FEATURES_LEN, TIMING_LEN, TimingTrailer, decode_feature_score,
    decode_features, encode_feature_score, encode_features,
};
use bytemuck::{Pod, Zeroable};

/// Everything the pipeline produces for one accepted packet.
///
/// Only the parts selected by `header.msg_type` go on the wire. `top` is carried
/// for in-process consumers and is never encoded.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PipelineOutput {
    pub header: PacketHeader,
    pub features: FeatureSnapshot,
    pub score: ScoreOutput,
    pub _pad: [u8; 4],
    pub top: TopOfBook,
    pub timing: TimingTrailer,
}

impl PipelineOutput {
    pub fn kind(&self) -> Result<MsgType, WireError> {
        self.header.kind()
    }

    pub fn is_ping(&self) -> bool {
        self.header.msg_type == MsgType::Ping as u8
    }

    /// Encoded size for this reply's message type.
    pub fn wire_len(&self) -> usize {
        match self.kind() {
            Ok(kind) => reply_len(kind),
            Err(_) => HEADER_LEN,
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.header.encode());
        match self.kind() {
            Ok(MsgType::Features) => buf.extend_from_slice(&encode_features(&self.features)),
            Ok(MsgType::FeatScore) => {
                buf.extend_from_slice(&encode_feature_score(&self.features, &self.score))
            }
            Ok(MsgType::FeaturesWithTiming) => {
                buf.extend_from_slice(&encode_features(&self.features));
                buf.extend_from_slice(&self.timing.encode());
            }
            _ => {}
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.wire_len());
        self.encode_into(&mut buf);
        buf
    }
}

/// Size of a reply frame of the given type.
pub fn reply_len(kind: MsgType) -> usize {
    match kind {
        MsgType::Ping | MsgType::Deltas => HEADER_LEN,
        MsgType::Features => HEADER_LEN + FEATURES_LEN,
        MsgType::FeatScore => HEADER_LEN + FEATURE_SCORE_LEN,
        MsgType::FeaturesWithTiming => HEADER_LEN + FEATURES_LEN + TIMING_LEN,
    }
}

/// Decodes a reply frame produced by [`PipelineOutput::encode_into`].
pub fn decode_response(buf: &[u8]) -> Result<PipelineOutput, WireError> {
    let header = PacketHeader::decode(buf)?;
    if !header.has_valid_magic() {
        return Err(WireError::BadMagic(header.magic));
    }
    let body = &buf[HEADER_LEN..];
    let mut out = PipelineOutput {
        header,
        ..Default::default()
    };

    match header.kind()? {
        MsgType::Ping => {}
        MsgType::Features => out.features = decode_features(body)?,
        MsgType::FeatScore => (out.features, out.score) = decode_feature_score(body)?,
        MsgType::FeaturesWithTiming => {
            out.features = decode_features(body)?;
            let trailer = body.get(FEATURES_LEN..).unwrap_or_default();
            out.timing = TimingTrailer::decode(trailer).map_err(|_| WireError::MalformedPacket {
                needed: reply_len(MsgType::FeaturesWithTiming),
                available: buf.len(),
            })?;
        }
        MsgType::Deltas => return Err(WireError::UnsupportedMessage(MsgType::Deltas as u8)),
    }
    Ok(out)
}
