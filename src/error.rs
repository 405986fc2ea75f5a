use thiserror::Error;

/// Failure to turn bytes into a LOB1 frame. The packet is dropped and no state is touched.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed packet: need {needed} bytes, have {available}")]
    MalformedPacket { needed: usize, available: usize },

    #[error("bad magic {0:02x?}, expected \"LOB1\"")]
    BadMagic([u8; 4]),

    #[error("unsupported message type {0}")]
    UnsupportedMessage(u8),

    #[error("i/o error while reading frame: {0}")]
    Io(#[from] std::io::Error),
}

/// A reload attempt that could not complete. The previously published weights stay active.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("weight stream underrun: expected {expected} words, stream ended after {consumed}")]
    WeightStreamUnderrun { expected: usize, consumed: usize },

    #[error("i/o error while reading weight stream: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported model type {0:?}, expected \"mlp\"")]
    UnsupportedModel(String),

    #[error("{field} has shape {actual}, expected {expected}")]
    Shape {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("{field}[{index}] = {value} does not fit in the target integer type")]
    Range {
        field: &'static str,
        index: usize,
        value: i64,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}
