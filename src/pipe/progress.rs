use crate::stage::{OutputCollector, Stage};
use bytemuck::Pod;
use spdlog::info;
use std::marker::PhantomData;
use std::time::Instant;

/// Pass-through stage that logs throughput every `interval` items.
pub struct Progress<T> {
    name: String,
    interval: usize,
    count: usize,
    last_instant: Instant,
    start_instant: Instant,
    _phantom: PhantomData<T>,
}

impl<T: Pod + Send> Progress<T> {
    pub fn new(name: impl Into<String>, interval: usize) -> Self {
        assert!(interval > 0, "interval must be greater than 0");
        let now = Instant::now();
        Self {
            name: name.into(),
            interval,
            count: 0,
            last_instant: now,
            start_instant: now,
            _phantom: PhantomData,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl<T: Pod + Send> Stage<T, T> for Progress<T> {
    #[inline(always)]
    fn process<C>(&mut self, data: &T, collector: &mut C)
    where
        C: OutputCollector<T>,
    {
        self.count += 1;
        if self.count.is_multiple_of(self.interval) {
            let now = Instant::now();
            let rate = self.interval as f64 / now.duration_since(self.last_instant).as_secs_f64();
            let avg = self.count as f64 / now.duration_since(self.start_instant).as_secs_f64();
            info!(
                "[{}] Processed {} packets, Rate: {} pkt/s, Avg: {} pkt/s",
                self.name,
                format_count(self.count as f64),
                format_count(rate),
                format_count(avg)
            );
            self.last_instant = now;
        }
        collector.push(data);
    }
}

pub fn progress<T: Pod + Send>(name: impl Into<String>, interval: usize) -> Progress<T> {
    Progress::new(name, interval)
}

fn format_count(val: f64) -> String {
    if val < 1000.0 {
        if val == val.floor() {
            format!("{:.0}", val)
        } else {
            format!("{:.2}", val)
        }
    } else if val < 1_000_000.0 {
        format!("{:.2}k", val / 1000.0)
    } else if val < 1_000_000_000.0 {
        format!("{:.2}m", val / 1_000_000.0)
    } else {
        format!("{:.2}b", val / 1_000_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{DeltaBatch, PacketHeader};

    #[test]
    fn test_progress_passes_everything_through() {
        let mut pipe = progress::<DeltaBatch>("ingress", 2);
        let mut seqs = Vec::new();
        for seq in 0..5 {
            let batch = DeltaBatch::empty(PacketHeader::deltas(seq, 0, 0, false));
            pipe.process(&batch, &mut |b: &DeltaBatch| seqs.push(b.header.seq));
        }
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(pipe.count(), 5);
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(999.0), "999");
        assert_eq!(format_count(12.5), "12.50");
        assert_eq!(format_count(1_500.0), "1.50k");
        assert_eq!(format_count(2_000_000.0), "2.00m");
        assert_eq!(format_count(3_000_000_000.0), "3.00b");
    }
}
