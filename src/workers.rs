use crate::measure::LatencyMeasurer;
use crate::op_counter::OpCounter;
use spdlog::{info, warn};
use std::hint::spin_loop;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Busy-polling worker threads that live as long as the pool.
///
/// Each worker calls its step function until the pool is dropped. A step returns
/// whether it did any work; idle workers spin briefly, then yield.
pub struct WorkerPool {
    running: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
    op_counter: Arc<OpCounter>,
    pin_cores: bool,
    latency_stats: bool,
}

const SPIN_STEPS: u32 = 10;
const YIELD_STEPS: u32 = 1000;

impl WorkerPool {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            handles: Vec::new(),
            op_counter: OpCounter::new(),
            pin_cores: false,
            latency_stats: false,
        }
    }

    /// Pin each new worker to core `worker_id % cores`.
    pub fn set_pin_cores(&mut self, pin: bool) {
        self.pin_cores = pin;
    }

    /// Measure every step of new workers and log the histogram when they stop.
    pub fn set_latency_stats(&mut self, enabled: bool) {
        self.latency_stats = enabled;
    }

    pub fn op_counter(&self) -> Arc<OpCounter> {
        self.op_counter.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    pub fn run_worker(&mut self, mut step: impl FnMut() -> bool + Send + 'static) -> io::Result<()> {
        let worker_id = self.handles.len();
        let running = self.running.clone();
        let pin_cores = self.pin_cores;
        let latency_stats = self.latency_stats;

        let handle = thread::Builder::new()
            .name(format!("pipeline-worker-{worker_id}"))
            .spawn(move || {
                if pin_cores {
                    pin_current(worker_id);
                }

                let mut measurer = latency_stats.then(|| LatencyMeasurer::new(1000));
                let mut idle_steps = 0u32;
                while running.load(Ordering::Relaxed) {
                    let started = measurer.as_ref().map(|_| Instant::now());
                    if step() {
                        idle_steps = 0;
                    } else {
                        idle_steps = idle_steps.saturating_add(1);
                        if idle_steps > YIELD_STEPS {
                            thread::yield_now();
                        } else if idle_steps > SPIN_STEPS {
                            spin_loop();
                        }
                    }
                    if let (Some(m), Some(t)) = (measurer.as_mut(), started) {
                        m.measure(t.elapsed());
                    }
                }

                if let Some(m) = measurer {
                    info!("[Latency/Worker:{}]{}", worker_id, m.format_stats());
                }
            })?;

        self.handles.push(handle);
        Ok(())
    }

    /// Returns once no reader has advanced for one poll period, or after `timeout`.
    pub fn await_idle(&self, timeout: Duration) {
        let start = Instant::now();
        let mut last = self.op_counter.total_op_count();
        loop {
            thread::sleep(Duration::from_millis(1));
            let now = self.op_counter.total_op_count();
            if now == last || start.elapsed() > timeout {
                break;
            }
            last = now;
        }
    }

    /// A worker that exits while the pool is still running has panicked.
    pub fn is_any_worker_panicked(&self) -> bool {
        self.running.load(Ordering::Relaxed) && self.handles.iter().any(|h| h.is_finished())
    }
}

fn pin_current(worker_id: usize) {
    let Some(cores) = core_affinity::get_core_ids() else {
        warn!("core pinning requested but core ids are unavailable");
        return;
    };
    if let Some(core) = cores.get(worker_id % cores.len().max(1)) {
        if !core_affinity::set_for_current(*core) {
            warn!("failed to pin worker {} to core {:?}", worker_id, core.id);
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for (id, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!("pipeline worker {} panicked", id);
            }
        }
    }
}
