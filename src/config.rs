use crate::features::FeatureParams;
use crate::wire::MsgType;
use clap::ValueEnum;

/// Which reply the pipeline emits for each DELTAS packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum OutputMode {
    /// FEATURES: header and the 16-byte feature payload.
    Features,
    /// FEAT_SCORE: header, features and the Q16.16 score.
    #[default]
    FeatScore,
    /// FEATURES_WITH_TIMING: header, features and five stage timestamps.
    Timing,
}

impl OutputMode {
    pub fn msg_type(self) -> MsgType {
        match self {
            OutputMode::Features => MsgType::Features,
            OutputMode::FeatScore => MsgType::FeatScore,
            OutputMode::Timing => MsgType::FeaturesWithTiming,
        }
    }
}

/// Default journal capacity. One `DeltaBatch` slot is ~3 KB, so this maps ~50 MB.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1 << 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub output: OutputMode,
    pub feature_params: FeatureParams,
    /// Items each journal in the threaded pipeline can hold.
    pub journal_capacity: usize,
    pub pin_cores: bool,
    pub latency_stats: bool,
    /// Packets between progress log lines. 0 disables progress logging.
    pub progress_interval: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output: OutputMode::default(),
            feature_params: FeatureParams::default(),
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            pin_cores: false,
            latency_stats: false,
            progress_interval: 0,
        }
    }
}
