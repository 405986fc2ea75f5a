use crate::wire::{Action, DeltaEvent, Side};
use bytemuck::{Pod, Zeroable};

/// Price levels held per side. Deltas addressing a level at or beyond this are ignored.
pub const LEVELS: usize = 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LevelArray {
    pub price: [i32; LEVELS],
    pub qty: [i32; LEVELS],
}

/// Best price and quantity on each side, always taken from level 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TopOfBook {
    pub bid_px: i32,
    pub bid_qty: i32,
    pub ask_px: i32,
    pub ask_qty: i32,
}

impl TopOfBook {
    /// Floor of the average of the two best prices.
    #[inline(always)]
    pub fn mid_price(&self) -> i32 {
        ((self.bid_px as i64 + self.ask_px as i64) >> 1) as i32
    }

    #[inline(always)]
    pub fn spread(&self) -> i64 {
        self.ask_px as i64 - self.bid_px as i64
    }

    /// Both sides quoted and bid at or through ask.
    pub fn is_crossed(&self) -> bool {
        self.bid_qty > 0 && self.ask_qty > 0 && self.bid_px >= self.ask_px
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BookState {
    pub bid: LevelArray,
    pub ask: LevelArray,
    pub best: TopOfBook,
}

impl BookState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Applies one delta. Never fails: out-of-range levels leave the book unchanged.
    #[inline]
    pub fn apply(&mut self, event: &DeltaEvent) {
        let level = event.level as usize;
        if level < LEVELS {
            let side = match event.side() {
                Side::Bid => &mut self.bid,
                Side::Ask => &mut self.ask,
            };
            match event.action() {
                Action::Set => {
                    side.price[level] = event.price_ticks;
                    side.qty[level] = event.qty;
                }
                Action::Add | Action::Update => {
                    side.qty[level] = side.qty[level].saturating_add(event.qty);
                }
                Action::Remove => side.qty[level] = 0,
            }
            side.qty[level] = side.qty[level].max(0);
        }
        self.refresh_best();
    }

    #[inline(always)]
    fn refresh_best(&mut self) {
        self.best = TopOfBook {
            bid_px: self.bid.price[0],
            bid_qty: self.bid.qty[0],
            ask_px: self.ask.price[0],
            ask_qty: self.ask.qty[0],
        };
    }

    pub fn side(&self, side: Side) -> &LevelArray {
        match side {
            Side::Bid => &self.bid,
            Side::Ask => &self.ask,
        }
    }

    #[inline(always)]
    pub fn top(&self) -> TopOfBook {
        self.best
    }

    pub fn mid_price(&self) -> i32 {
        self.best.mid_price()
    }

    pub fn spread(&self) -> i64 {
        self.best.spread()
    }

    pub fn is_crossed(&self) -> bool {
        self.best.is_crossed()
    }
}
