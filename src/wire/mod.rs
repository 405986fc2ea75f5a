//! LOB1 wire codec: 32-byte header, 16-byte delta records and the reply payloads.
//! Every multi-byte field is big-endian.

pub mod delta;
pub mod framer;
pub mod header;
pub mod payload;
pub mod response;

pub use delta::{
    Action, DELTA_LEN, DeltaBatch, DeltaEvent, DeltaRecord, Side, decode_packet,
    encode_deltas_packet,
};
pub use framer::{PacketFramer, frame_len};
pub use header::{
    FLAG_RESET, HEADER_LEN, MAGIC, MAX_DELTAS_PER_PACKET, MsgType, PacketHeader, VERSION,
};
pub use payload::{
    FEATURE_SCORE_LEN, FEATURES_LEN, TIMING_LEN, TimingTrailer, decode_feature_score,
    decode_features, encode_feature_score, encode_features,
};
pub use response::{PipelineOutput, decode_response, reply_len};
