//! Rule-based reflexes and the arbiter that combines them with the model score.

use crate::book::TopOfBook;
use crate::mlp::ScoreOutput;
use crate::stage::{OutputCollector, Stage};
use crate::wire::PipelineOutput;
use bytemuck::{Pod, Zeroable};

#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReflexAction {
    #[default]
    None = 0,
    CancelAll = 1,
    TakeLiquidity = 2,
    WidenSpreads = 3,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Decision {
    #[default]
    Hold = 0,
    Buy = 1,
    Sell = 2,
    Cancel = 3,
}

impl Decision {
    pub const ALL: [Decision; 4] = [Decision::Hold, Decision::Buy, Decision::Sell, Decision::Cancel];

    pub fn from_u8(v: u8) -> Decision {
        match v {
            1 => Decision::Buy,
            2 => Decision::Sell,
            3 => Decision::Cancel,
            _ => Decision::Hold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflexEngine {
    pub spread_limit_ticks: i64,
    pub max_inventory: i32,
    inventory: i32,
}

impl Default for ReflexEngine {
    fn default() -> Self {
        Self {
            spread_limit_ticks: 1000,
            max_inventory: 100,
            inventory: 0,
        }
    }
}

impl ReflexEngine {
    pub fn inventory(&self) -> i32 {
        self.inventory
    }

    pub fn on_fill(&mut self, signed_qty: i32) {
        self.inventory = self.inventory.saturating_add(signed_qty);
    }

    /// First matching rule wins: crossed book, blown-out spread, inventory limit.
    pub fn evaluate(&self, top: &TopOfBook) -> ReflexAction {
        if top.is_crossed() {
            return ReflexAction::TakeLiquidity;
        }
        let quoted = top.bid_qty > 0 && top.ask_qty > 0;
        if quoted && top.spread() > self.spread_limit_ticks {
            return ReflexAction::WidenSpreads;
        }
        if self.inventory.unsigned_abs() > self.max_inventory.unsigned_abs() {
            return ReflexAction::CancelAll;
        }
        ReflexAction::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arbiter {
    pub threshold_q16_16: i32,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self {
            threshold_q16_16: 200 << 16,
        }
    }
}

impl Arbiter {
    /// Reflex safety rules override the score.
    pub fn decide(&self, reflex: ReflexAction, score: ScoreOutput) -> Decision {
        match reflex {
            ReflexAction::CancelAll => Decision::Cancel,
            ReflexAction::TakeLiquidity => Decision::Buy,
            _ if score.score_q16_16 > self.threshold_q16_16 => Decision::Buy,
            _ if score.score_q16_16 < -self.threshold_q16_16 => Decision::Sell,
            _ => Decision::Hold,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DecisionRecord {
    pub seq: u32,
    pub score_q16_16: i32,
    pub reflex: u8,
    pub decision: u8,
    pub _pad: [u8; 2],
}

impl DecisionRecord {
    pub fn decision(&self) -> Decision {
        Decision::from_u8(self.decision)
    }
}

/// Turns scored replies into decisions. PING replies produce nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyStage {
    pub reflex: ReflexEngine,
    pub arbiter: Arbiter,
}

impl StrategyStage {
    pub fn evaluate(&self, out: &PipelineOutput) -> DecisionRecord {
        let reflex = self.reflex.evaluate(&out.top);
        let decision = self.arbiter.decide(reflex, out.score);
        DecisionRecord {
            seq: out.header.seq,
            score_q16_16: out.score.score_q16_16,
            reflex: reflex as u8,
            decision: decision as u8,
            _pad: [0; 2],
        }
    }
}

impl Stage<PipelineOutput, DecisionRecord> for StrategyStage {
    #[inline]
    fn process<C>(&mut self, data: &PipelineOutput, collector: &mut C)
    where
        C: OutputCollector<DecisionRecord>,
    {
        if !data.is_ping() {
            collector.push(&self.evaluate(data));
        }
    }
}
