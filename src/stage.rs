use bytemuck::Pod;
use std::marker::PhantomData;

/// One step of the packet pipeline. A stage may emit zero, one or many items per input.
pub trait Stage<In: Pod + Send, Out: Pod + Send> {
    fn process<C>(&mut self, data: &In, collector: &mut C)
    where
        C: OutputCollector<Out>;
}

/// Receives the items a stage emits.
pub trait OutputCollector<T> {
    fn push(&mut self, item: &T);
}

impl<T, F> OutputCollector<T> for F
where
    F: FnMut(&T),
{
    #[inline(always)]
    fn push(&mut self, item: &T) {
        (self)(item);
    }
}

impl<F, In, Out> Stage<In, Out> for F
where
    F: FnMut(&In) -> Option<Out>,
    In: Pod + Send,
    Out: Pod + Send,
{
    #[inline(always)]
    fn process<C>(&mut self, data: &In, collector: &mut C)
    where
        C: OutputCollector<Out>,
    {
        if let Some(out) = (self)(data) {
            collector.push(&out);
        }
    }
}

/// Two stages fused into one, running on the same thread.
pub struct Pipeline<S1, S2, In, Mid, Out> {
    s1: S1,
    s2: S2,
    _phantom: PhantomData<(In, Mid, Out)>,
}

impl<S1, S2, In, Mid, Out> Pipeline<S1, S2, In, Mid, Out> {
    pub fn first(&self) -> &S1 {
        &self.s1
    }

    pub fn second(&self) -> &S2 {
        &self.s2
    }
}

impl<In, Mid, Out, S1, S2> Stage<In, Out> for Pipeline<S1, S2, In, Mid, Out>
where
    In: Pod + Send,
    Mid: Pod + Send,
    Out: Pod + Send,
    S1: Stage<In, Mid>,
    S2: Stage<Mid, Out>,
{
    #[inline(always)]
    fn process<C>(&mut self, data: &In, collector: &mut C)
    where
        C: OutputCollector<Out>,
    {
        let s2 = &mut self.s2;
        self.s1.process(data, &mut |mid: &Mid| s2.process(mid, collector));
    }
}

pub trait StageExt<In: Pod + Send, Mid: Pod + Send>: Stage<In, Mid> {
    #[inline(always)]
    fn pipe<Out: Pod + Send, S2: Stage<Mid, Out>>(self, s2: S2) -> Pipeline<Self, S2, In, Mid, Out>
    where
        Self: Sized,
    {
        Pipeline {
            s1: self,
            s2,
            _phantom: PhantomData,
        }
    }
}

impl<S, In, Mid> StageExt<In, Mid> for S
where
    In: Pod + Send,
    Mid: Pod + Send,
    S: Stage<In, Mid>,
{
}

/// Chains stages left to right: `pipe![decode, book, score]`.
#[macro_export]
macro_rules! pipe {
    ($s1:expr) => { $s1 };
    ($s1:expr, $($rest:expr),+ $(,)?) => {
        {
            use $crate::stage::StageExt;
            $s1.pipe($crate::pipe!($($rest),+))
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Action, DeltaBatch, DeltaEvent, PacketHeader, Side};

    fn batch(n: u32) -> DeltaBatch {
        let mut b = DeltaBatch::empty(PacketHeader::deltas(1, 10, n as u16, false));
        for i in 0..n as usize {
            b.events[i] = DeltaEvent::new(Side::Bid, Action::Add, 0, 100, i as i32 + 1);
        }
        b.count = n;
        b
    }

    #[test]
    fn test_pipe_closures() {
        let mut p = pipe![
            |b: &DeltaBatch| Some(b.count),
            |n: &u32| Some(*n as u64 * 2),
        ];

        let mut out = Vec::new();
        p.process(&batch(3), &mut |x: &u64| out.push(*x));
        assert_eq!(out, vec![6]);
    }

    #[test]
    fn test_fan_out_per_event() {
        struct Explode;
        impl Stage<DeltaBatch, DeltaEvent> for Explode {
            fn process<C>(&mut self, data: &DeltaBatch, collector: &mut C)
            where
                C: OutputCollector<DeltaEvent>,
            {
                for ev in data.events() {
                    collector.push(ev);
                }
            }
        }

        let mut p = pipe![Explode, |ev: &DeltaEvent| Some(ev.qty)];
        let mut out = Vec::new();
        p.process(&batch(4), &mut |q: &i32| out.push(*q));
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_filtering_stage_drops() {
        let mut p = pipe![|b: &DeltaBatch| (b.count > 0).then_some(b.count)];
        let mut out = Vec::new();
        p.process(&batch(0), &mut |x: &u32| out.push(*x));
        p.process(&batch(2), &mut |x: &u32| out.push(*x));
        assert_eq!(out, vec![2]);
    }
}
