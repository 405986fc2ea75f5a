use crate::book::TopOfBook;
use crate::wire::DeltaEvent;
use crate::wire::Side;
use bytemuck::{Pod, Zeroable};

/// One unit-weight event in Q16.16, registered by every snapshot.
pub const BURST_UNIT_Q16_16: u32 = 1 << 16;

pub const DEFAULT_TAU_BURST_NS: u64 = 200_000;
pub const DEFAULT_TAU_VOL_NS: u64 = 2_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureParams {
    pub tau_burst_ns: u64,
    pub tau_vol_ns: u64,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            tau_burst_ns: DEFAULT_TAU_BURST_NS,
            tau_vol_ns: DEFAULT_TAU_VOL_NS,
        }
    }
}

/// Streaming state carried from batch to batch.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FeatureAccumulators {
    pub ofi_accum: i32,
    pub mid_prev: i32,
    /// Timestamp of the previous snapshot, 0 while unset.
    pub last_t_ns: u64,
    pub burst_q16_16: u32,
    pub vol_q16_16: u32,
}

/// Features derived once per batch.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct FeatureSnapshot {
    pub ofi_q32: i32,
    pub tob_imb_q1_15: i16,
    pub rsv0: u16,
    pub burst_q16_16: u32,
    pub vol_q16_16: u32,
}

pub struct FeatureEngine {
    params: FeatureParams,
    acc: FeatureAccumulators,
}

impl FeatureEngine {
    pub fn new(params: FeatureParams) -> Self {
        Self {
            params,
            acc: FeatureAccumulators::default(),
        }
    }

    /// Folds one delta into the OFI accumulator. Only Add and Update count.
    #[inline(always)]
    pub fn update_ofi(&mut self, event: &DeltaEvent) {
        if !event.action().is_additive() {
            return;
        }
        self.acc.ofi_accum = match event.side() {
            Side::Bid => self.acc.ofi_accum.saturating_add(event.qty),
            Side::Ask => self.acc.ofi_accum.saturating_sub(event.qty),
        };
    }

    /// Closes a batch stamped `t_ns` and advances the accumulators.
    pub fn snapshot(&mut self, t_ns: u64, top: &TopOfBook) -> FeatureSnapshot {
        let dt = clamp_dt(self.acc.last_t_ns, t_ns);
        self.acc.last_t_ns = t_ns;

        let tob = tob_imbalance_q1_15(top.bid_qty, top.ask_qty);

        self.acc.burst_q16_16 = burst_step(
            self.acc.burst_q16_16,
            dt,
            self.params.tau_burst_ns,
            BURST_UNIT_Q16_16,
        );

        let mid = top.mid_price();
        let abs_diff_q16_16 = (mid as i64 - self.acc.mid_prev as i64).abs() << 16;
        self.acc.mid_prev = mid;
        self.acc.vol_q16_16 = ewma_vol(self.acc.vol_q16_16, abs_diff_q16_16, dt, self.params.tau_vol_ns);

        FeatureSnapshot {
            ofi_q32: self.acc.ofi_accum,
            tob_imb_q1_15: tob,
            rsv0: 0,
            burst_q16_16: self.acc.burst_q16_16,
            vol_q16_16: self.acc.vol_q16_16,
        }
    }

    pub fn reset(&mut self) {
        self.acc = FeatureAccumulators::default();
    }

    pub fn accumulators(&self) -> &FeatureAccumulators {
        &self.acc
    }

    pub fn params(&self) -> &FeatureParams {
        &self.params
    }
}

/// Elapsed time since `last_t_ns`, 0 when unset or when time went backwards,
/// saturated to 32 bits.
#[inline(always)]
pub fn clamp_dt(last_t_ns: u64, now_ns: u64) -> u32 {
    if last_t_ns == 0 {
        return 0;
    }
    now_ns.saturating_sub(last_t_ns).min(u32::MAX as u64) as u32
}

/// `(bid - ask) << 15 / (bid + ask)` truncated, clamped to Q1.15. Empty top of book is 0.
#[inline(always)]
pub fn tob_imbalance_q1_15(bid_qty: i32, ask_qty: i32) -> i16 {
    let num = bid_qty as i64 - ask_qty as i64;
    let den = bid_qty as i64 + ask_qty as i64;
    if den == 0 {
        return 0;
    }
    ((num << 15) / den).clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Leaky bucket step: `burst - burst * dt / tau + unit`, saturated to u32.
#[inline(always)]
pub fn burst_step(burst_q16_16: u32, dt_ns: u32, tau_ns: u64, unit_q16_16: u32) -> u32 {
    let burst = burst_q16_16 as i128;
    let decay = burst * dt_ns as i128 / tau_ns.max(1) as i128;
    saturate_u32(burst - decay + unit_q16_16 as i128)
}

/// Leak alone, with no arrival registered.
#[inline(always)]
pub fn leak_burst(burst_q16_16: u32, dt_ns: u32, tau_ns: u64) -> u32 {
    burst_step(burst_q16_16, dt_ns, tau_ns, 0)
}

/// EWMA of the absolute mid move: `vol + (abs_diff - vol) * dt / tau`, saturated to u32.
#[inline(always)]
pub fn ewma_vol(vol_q16_16: u32, abs_diff_q16_16: i64, dt_ns: u32, tau_ns: u64) -> u32 {
    let vol = vol_q16_16 as i128;
    let delta = (abs_diff_q16_16 as i128 - vol) * dt_ns as i128 / tau_ns.max(1) as i128;
    saturate_u32(vol + delta)
}

#[inline(always)]
fn saturate_u32(v: i128) -> u32 {
    v.clamp(0, u32::MAX as i128) as u32
}
