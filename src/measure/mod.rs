pub mod clock;
pub mod latency_measurer;

pub use clock::wall_clock_ns;
pub use latency_measurer::{LatencyMeasurer, LatencyStats};
