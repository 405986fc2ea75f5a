use hdrhistogram::Histogram;
use std::time::{Duration, Instant};

const LOWEST_NS: u64 = 1;
const HIGHEST_NS: u64 = 1_000_000_000_000;

/// Latency percentiles in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub p999: u64,
    pub p9999: u64,
}

pub struct LatencyMeasurerGuard<'a> {
    measurer: &'a mut LatencyMeasurer,
    start: Option<Instant>,
}

impl Drop for LatencyMeasurerGuard<'_> {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            self.measurer.record(start.elapsed());
        }
    }
}

/// HDR histogram over 1ns..1000s with 3 significant digits. Only every
/// `sample_rate`-th call is recorded.
pub struct LatencyMeasurer {
    histogram: Histogram<u64>,
    sample_rate: u64,
    step: u64,
}

impl LatencyMeasurer {
    pub fn new(sample_rate: u64) -> Self {
        assert!(sample_rate > 0, "sample_rate must be positive");
        let histogram = Histogram::<u64>::new_with_bounds(LOWEST_NS, HIGHEST_NS, 3)
            .expect("histogram bounds are static and valid");
        Self {
            histogram,
            sample_rate,
            step: 0,
        }
    }

    #[inline(always)]
    fn sampled(&mut self) -> bool {
        self.step += 1;
        self.step.is_multiple_of(self.sample_rate)
    }

    pub fn measure(&mut self, duration: Duration) {
        if self.sampled() {
            self.record(duration);
        }
    }

    /// Records the time until the guard is dropped, subject to sampling.
    pub fn measure_with_guard(&mut self) -> LatencyMeasurerGuard<'_> {
        let start = self.sampled().then(Instant::now);
        LatencyMeasurerGuard {
            measurer: self,
            start,
        }
    }

    /// Records a span given as two nanosecond stamps from the same clock.
    pub fn measure_span(&mut self, start_ns: u64, end_ns: u64) {
        self.measure(Duration::from_nanos(end_ns.saturating_sub(start_ns)));
    }

    fn record(&mut self, duration: Duration) {
        let nanos = (duration.as_nanos() as u64).clamp(LOWEST_NS, HIGHEST_NS);
        self.histogram.saturating_record(nanos);
    }

    pub fn reset(&mut self) {
        self.histogram.reset();
    }

    pub fn get_stats(&self) -> LatencyStats {
        let h = &self.histogram;
        if h.is_empty() {
            return LatencyStats::default();
        }
        LatencyStats {
            count: h.len(),
            min: h.min(),
            max: h.max(),
            mean: h.mean(),
            p50: h.value_at_quantile(0.5),
            p90: h.value_at_quantile(0.9),
            p99: h.value_at_quantile(0.99),
            p999: h.value_at_quantile(0.999),
            p9999: h.value_at_quantile(0.9999),
        }
    }

    pub fn format_stats(&self) -> String {
        let s = self.get_stats();
        if s.count == 0 {
            return "No stats collected yet".into();
        }
        format!(
            "\tn={},\tmin={},\tmax={},\tmean={},\tp50={},\tp90={},\tp99={},\tp999={},\tp9999={}",
            s.count,
            format_duration(s.min as f64),
            format_duration(s.max as f64),
            format_duration(s.mean),
            format_duration(s.p50 as f64),
            format_duration(s.p90 as f64),
            format_duration(s.p99 as f64),
            format_duration(s.p999 as f64),
            format_duration(s.p9999 as f64),
        )
    }
}

fn format_duration(nanos: f64) -> String {
    if nanos < 1000.0 {
        format!("{:.1}ns", nanos)
    } else if nanos < 1_000_000.0 {
        format!("{:.1}us", nanos / 1000.0)
    } else if nanos < 1_000_000_000.0 {
        format!("{:.1}ms", nanos / 1_000_000.0)
    } else {
        format!("{:.2}s", nanos / 1_000_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling() {
        let mut m = LatencyMeasurer::new(4);
        for _ in 0..16 {
            m.measure(Duration::from_micros(3));
        }
        let stats = m.get_stats();
        assert_eq!(stats.count, 4);
        assert!(stats.p50 >= 2_990 && stats.p50 <= 3_010);
    }

    #[test]
    fn test_span_and_clamp() {
        let mut m = LatencyMeasurer::new(1);
        m.measure_span(100, 50);
        m.measure_span(1_000, 2_000);
        let stats = m.get_stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, 1);
        assert!(stats.max >= 999 && stats.max <= 1_001);
    }

    #[test]
    fn test_empty_stats() {
        let m = LatencyMeasurer::new(1);
        assert_eq!(m.get_stats(), LatencyStats::default());
        assert_eq!(m.format_stats(), "No stats collected yet");
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_duration(12.0), "12.0ns");
        assert_eq!(format_duration(1_500.0), "1.5us");
        assert_eq!(format_duration(2_500_000.0), "2.5ms");
        assert_eq!(format_duration(3_000_000_000.0), "3.00s");
    }
}
