use crate::features::FeatureSnapshot;
use crate::mlp::{HIDDEN, INPUTS, MlpWeights, ScoreOutput};

const MIN_SCALE: f32 = 1e-12;

/// `1 / scale`, or 0 when the scale is too small to invert.
#[inline(always)]
pub fn inverse_scale(scale: f32) -> f32 {
    if scale > MIN_SCALE { 1.0 / scale } else { 0.0 }
}

/// `x * inv_scale` rounded half away from zero, clamped to i8.
#[inline(always)]
pub fn quantize_i8(x: f32, inv_scale: f32) -> i8 {
    let half = if x >= 0.0 { 0.5 } else { -0.5 };
    ((x * inv_scale + half) as i32).clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

/// `logit * 65536` clamped to the i32 range, rounded half away from zero.
#[inline(always)]
pub fn score_q16_16(logit: f32) -> i32 {
    let scaled = (logit * 65536.0).clamp(-2147483648.0, 2147483647.0);
    let half = if scaled >= 0.0 { 0.5 } else { -0.5 };
    (scaled + half) as i32
}

/// Runs one forward pass. Pure: identical snapshot and weights give an identical score.
#[inline]
pub fn infer(snapshot: &FeatureSnapshot, weights: &MlpWeights) -> ScoreOutput {
    let s = &weights.scales;

    let x: [f32; INPUTS] = [
        snapshot.ofi_q32 as f32,
        snapshot.tob_imb_q1_15 as f32 / 32768.0,
        snapshot.burst_q16_16 as f32 / 65536.0,
        snapshot.vol_q16_16 as f32 / 65536.0,
    ];
    let inv_in = inverse_scale(s.in_scale);
    let xi = x.map(|v| quantize_i8(v, inv_in) as i32);

    let s0 = s.in_scale * s.w0_scale;
    let inv_act0 = inverse_scale(s.act0_scale);

    let mut acc1 = weights.b1;
    for h in 0..HIDDEN {
        let mut acc = weights.b0[h];
        for d in 0..INPUTS {
            acc = acc.wrapping_add(xi[d].wrapping_mul(weights.w0[h][d] as i32));
        }
        let val = (acc as f32 * s0).max(0.0);
        let y = quantize_i8(val * inv_act0, 1.0) as i32;
        acc1 = acc1.wrapping_add(y.wrapping_mul(weights.w1[h] as i32));
    }

    let logit = acc1 as f32 * (s.act0_scale * s.w1_scale);
    ScoreOutput {
        score_q16_16: score_q16_16(logit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::Scales;

    #[test]
    fn test_quantize_rounding() {
        assert_eq!(quantize_i8(2.5, 1.0), 3);
        assert_eq!(quantize_i8(-2.5, 1.0), -3);
        assert_eq!(quantize_i8(2.49, 1.0), 2);
        assert_eq!(quantize_i8(1000.0, 1.0), 127);
        assert_eq!(quantize_i8(-1000.0, 1.0), -128);
        assert_eq!(quantize_i8(3.0, 0.5), 2);
        assert_eq!(quantize_i8(5.0, inverse_scale(0.0)), 0);
    }

    #[test]
    fn test_score_rounding_and_clamp() {
        assert_eq!(score_q16_16(1.0), 65536);
        assert_eq!(score_q16_16(-1.5), -98304);
        assert_eq!(score_q16_16(1e12), i32::MAX);
        assert_eq!(score_q16_16(-1e12), i32::MIN);
        assert_eq!(score_q16_16(0.5 / 65536.0), 1);
        assert_eq!(score_q16_16(-0.5 / 65536.0), -1);
    }

    fn known_weights() -> MlpWeights {
        let mut w = MlpWeights {
            scales: Scales {
                in_scale: 1.0,
                w0_scale: 0.5,
                act0_scale: 0.25,
                w1_scale: 0.5,
            },
            b1: -100,
            ..Default::default()
        };
        for h in 0..HIDDEN {
            w.w0[h] = [1, 2, -1, 0];
            w.b0[h] = h as i32 - 16;
            w.w1[h] = 1;
        }
        w
    }

    #[test]
    fn test_known_score() {
        // xi = [10, 1, 3, 2]; acc_h = 9 + h - 16; y_h = round(acc_h * 0.5 / 0.25)
        // = 2 * max(h - 7, 0); sum = 600; acc1 = 500; logit = 500 * 0.125 = 62.5.
        let snapshot = FeatureSnapshot {
            ofi_q32: 10,
            tob_imb_q1_15: 16384,
            rsv0: 0,
            burst_q16_16: 3 << 16,
            vol_q16_16: 2 << 16,
        };
        let out = infer(&snapshot, &known_weights());
        assert_eq!(out.score_q16_16, 4_096_000);
        assert_eq!(infer(&snapshot, &known_weights()), out);
    }

    #[test]
    fn test_hidden_activation_clamps() {
        let mut w = known_weights();
        w.b0 = [10_000; HIDDEN];
        w.b1 = 0;
        // every hidden unit saturates at 127
        let out = infer(&FeatureSnapshot::default(), &w);
        assert_eq!(out.score_q16_16, score_q16_16((127 * HIDDEN as i32) as f32 * 0.125));
    }

    #[test]
    fn test_zero_weights_score_bias_only() {
        let w = MlpWeights {
            b1: 8,
            scales: Scales {
                act0_scale: 0.5,
                w1_scale: 0.25,
                ..Scales::default()
            },
            ..Default::default()
        };
        assert_eq!(infer(&FeatureSnapshot::default(), &w).score_q16_16, 65536);
    }
}
