pub mod book;
pub mod config;
pub mod driver;
pub mod error;
pub mod features;
pub mod journal;
pub mod measure;
pub mod mlp;
mod op_counter;
pub mod pipe;
pub mod stage;
pub mod strategy;
pub mod threaded;
pub mod wire;
pub mod workers;

pub use crate::book::{BookState, LEVELS, LevelArray, TopOfBook};
pub use crate::config::{DEFAULT_JOURNAL_CAPACITY, OutputMode, PipelineConfig};
pub use crate::driver::{DriverStats, PipelineDriver};
pub use crate::error::{ManifestError, PipelineError, ReloadError, WireError};
pub use crate::features::{FeatureAccumulators, FeatureEngine, FeatureParams, FeatureSnapshot};
pub use crate::journal::{Journal, JournalReader};
pub use crate::mlp::{MlpWeights, ModelManifest, ReloadCounts, Scales, ScoreOutput, WeightStore};
pub use crate::op_counter::OpCounter;
pub use crate::pipe::*;
pub use crate::stage::{OutputCollector, Pipeline, Stage, StageExt};
pub use crate::strategy::{Arbiter, Decision, DecisionRecord, ReflexAction, ReflexEngine, StrategyStage};
pub use crate::threaded::ThreadedPipeline;
pub use crate::wire::{DeltaBatch, DeltaEvent, DeltaRecord, PacketFramer, PacketHeader, PipelineOutput};
pub use crate::workers::WorkerPool;
