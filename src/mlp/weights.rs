use crate::mlp::reload::{ReloadCounts, pack_bytes_be};
use crate::mlp::{HIDDEN, INPUTS};

/// Dequantization scales supplied alongside the integer weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scales {
    pub in_scale: f32,
    pub w0_scale: f32,
    pub act0_scale: f32,
    pub w1_scale: f32,
}

impl Default for Scales {
    fn default() -> Self {
        Self {
            in_scale: 1.0,
            w0_scale: 1.0,
            act0_scale: 1.0,
            w1_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MlpWeights {
    /// Row-major `[hidden][input]`.
    pub w0: [[i8; INPUTS]; HIDDEN],
    pub b0: [i32; HIDDEN],
    pub w1: [i8; HIDDEN],
    pub b1: i32,
    pub scales: Scales,
}

impl MlpWeights {
    /// W0 flattened row-major, as it travels on the reload stream.
    pub fn w0_bytes(&self) -> [u8; HIDDEN * INPUTS] {
        let mut out = [0u8; HIDDEN * INPUTS];
        for (h, row) in self.w0.iter().enumerate() {
            for (d, w) in row.iter().enumerate() {
                out[h * INPUTS + d] = *w as u8;
            }
        }
        out
    }

    pub fn w1_bytes(&self) -> [u8; HIDDEN] {
        self.w1.map(|w| w as u8)
    }

    /// The full reload stream for these weights: W0 packed, B0, W1 packed, B1.
    /// Feed it back with [`ReloadCounts::FULL`].
    pub fn reload_words(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(ReloadCounts::FULL.total_words());
        words.extend(pack_bytes_be(&self.w0_bytes()));
        words.extend(self.b0.iter().map(|b| *b as u32));
        words.extend(pack_bytes_be(&self.w1_bytes()));
        words.push(self.b1 as u32);
        words
    }
}
