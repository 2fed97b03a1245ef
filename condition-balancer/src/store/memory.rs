use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use common_types::Variant;

use super::{AssignmentRequest, CounterStore, CounterStoreError};
use crate::selection::pick_least_assigned;

type Counters = HashMap<String, BTreeMap<Variant, i64>>;

/// In-process counters guarded by a single mutex.
///
/// Only atomic within one process: meant for local development and tests.
/// Can simulate an outage and a slow store.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    counters: Arc<Mutex<Counters>>,
    unavailable: Arc<AtomicBool>,
    latency: Option<Duration>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before touching the counters.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Counters>, CounterStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CounterStoreError::Unavailable(
                "simulated outage".to_string(),
            ));
        }
        self.counters
            .lock()
            .map_err(|_| CounterStoreError::Unavailable("poisoned counter lock".to_string()))
    }

    async fn wait(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn assign_next(
        &self,
        request: &AssignmentRequest<'_>,
    ) -> Result<Variant, CounterStoreError> {
        self.wait().await;

        let mut counters = self.lock()?;
        let experiment = counters
            .get_mut(request.experiment_id)
            .ok_or_else(|| CounterStoreError::NotSeeded(request.experiment_id.to_string()))?;

        let rows = experiment
            .iter()
            .map(|(variant, count)| (variant.to_string(), *count));
        let counts = super::collect_counts(request.experiment_id, rows, request.variants)?;

        let picked = pick_least_assigned(&counts, request.tie_break, request.tie_seed)
            .ok_or_else(|| CounterStoreError::NotSeeded(request.experiment_id.to_string()))?;
        *experiment.entry(picked).or_insert(0) += 1;

        Ok(picked)
    }

    async fn seed(
        &self,
        experiment_id: &str,
        variants: &[Variant],
    ) -> Result<(), CounterStoreError> {
        let mut counters = self.lock()?;
        let experiment = counters.entry(experiment_id.to_string()).or_default();
        for variant in variants {
            experiment.entry(*variant).or_insert(0);
        }
        Ok(())
    }

    async fn counts(&self, experiment_id: &str) -> Result<Vec<(Variant, i64)>, CounterStoreError> {
        let counters = self.lock()?;
        Ok(counters
            .get(experiment_id)
            .map(|experiment| experiment.iter().map(|(v, c)| (*v, *c)).collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), CounterStoreError> {
        self.lock().map(|_| ())
    }
}
