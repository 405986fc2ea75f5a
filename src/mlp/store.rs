use crate::error::ReloadError;
use crate::mlp::reload::{ReloadCounts, ReloadReport, WordSource, reload_into};
use crate::mlp::{MlpWeights, Scales};
use arc_swap::{ArcSwap, Guard};
use spdlog::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Published weight set shared by inference and reload.
///
/// Readers take a snapshot with [`WeightStore::load`] and keep it for the whole
/// forward pass, so a concurrent reload never shows them a half-written set.
/// Writers are serialized; a new set becomes visible in one pointer swap.
pub struct WeightStore {
    current: ArcSwap<MlpWeights>,
    version: AtomicU64,
    writer: Mutex<()>,
}

impl WeightStore {
    pub fn new(weights: MlpWeights) -> Self {
        Self {
            current: ArcSwap::from_pointee(weights),
            version: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    #[inline(always)]
    pub fn load(&self) -> Guard<Arc<MlpWeights>> {
        self.current.load()
    }

    pub fn snapshot(&self) -> MlpWeights {
        **self.current.load()
    }

    /// Number of sets published since construction.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn replace(&self, weights: MlpWeights) {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        self.publish(weights);
    }

    pub fn set_scales(&self, scales: Scales) {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = **self.current.load();
        next.scales = scales;
        self.publish(next);
    }

    /// Reads one reload sequence and publishes the result. On failure the stream
    /// position is lost and the previous set stays active.
    pub fn reload<S: WordSource + ?Sized>(
        &self,
        source: &mut S,
        counts: ReloadCounts,
    ) -> Result<ReloadReport, ReloadError> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut staged = **self.current.load();
        match reload_into(&mut staged, source, counts) {
            Ok(mut report) => {
                report.version = self.publish(staged);
                info!(
                    "weights reloaded: {} words, {} elements, version {}",
                    report.words_consumed, report.elements_loaded, report.version
                );
                Ok(report)
            }
            Err(e) => {
                warn!("weight reload aborted, keeping version {}: {}", self.version(), e);
                Err(e)
            }
        }
    }

    fn publish(&self, weights: MlpWeights) -> u64 {
        self.current.store(Arc::new(weights));
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for WeightStore {
    fn default() -> Self {
        Self::new(MlpWeights::default())
    }
}
