//! Quantized two-layer perceptron (4 inputs, 32 hidden units, ReLU, scalar output).

mod infer;
mod manifest;
mod reload;
mod store;
mod weights;

use bytemuck::{Pod, Zeroable};

pub use infer::{infer, inverse_scale, quantize_i8, score_q16_16};
pub use manifest::{Bias1, ModelManifest, Weights1};
pub use reload::{BeWordReader, ReloadCounts, ReloadReport, WordSource, pack_bytes_be, reload_into};
pub use store::WeightStore;
pub use weights::{MlpWeights, Scales};

pub const INPUTS: usize = 4;
pub const HIDDEN: usize = 32;

/// Inference result in Q16.16.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct ScoreOutput {
    pub score_q16_16: i32,
}

impl ScoreOutput {
    pub fn as_f64(&self) -> f64 {
        self.score_q16_16 as f64 / 65536.0
    }
}
