use std::sync::Arc;
use std::time::Duration;

use common_metrics::{inc, timing_guard};
use common_types::Variant;
use thiserror::Error;
use tokio::time::timeout;
use tracing::instrument;

use crate::metrics_consts::{
    ASSIGNMENT_ERRORS_COUNTER, ASSIGNMENT_TIME, CONDITION_ASSIGNMENTS_COUNTER,
};
use crate::selection::TieBreak;
use crate::store::{AssignmentRequest, CounterStore, CounterStoreError};

#[derive(Error, Debug)]
pub enum BalancerError {
    #[error("counter store unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<CounterStoreError> for BalancerError {
    fn from(e: CounterStoreError) -> Self {
        tracing::error!("condition assignment failed: {}", e);
        BalancerError::StorageUnavailable(e.to_string())
    }
}

/// Hands out the least assigned variant of one experiment.
///
/// Holds no counts itself: every call goes through the store's atomic
/// read-select-increment. Failures are reported as they happen, there is no
/// retry and no fallback variant.
pub struct ConditionBalancer {
    store: Arc<dyn CounterStore>,
    experiment_id: String,
    tie_break: TieBreak,
    store_timeout: Duration,
}

impl ConditionBalancer {
    pub fn new(
        store: Arc<dyn CounterStore>,
        experiment_id: String,
        tie_break: TieBreak,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            experiment_id,
            tie_break,
            store_timeout,
        }
    }

    #[instrument(skip_all, fields(experiment_id = %self.experiment_id))]
    pub async fn assign(&self) -> Result<Variant, BalancerError> {
        let request = AssignmentRequest {
            experiment_id: &self.experiment_id,
            variants: &Variant::ALL,
            tie_break: self.tie_break,
            tie_seed: rand::random(),
        };

        let timer = timing_guard(ASSIGNMENT_TIME, &[]);
        let result = match timeout(self.store_timeout, self.store.assign_next(&request)).await {
            Ok(assigned) => assigned.map_err(BalancerError::from),
            Err(_) => {
                tracing::error!(
                    "condition assignment timed out after {:?}",
                    self.store_timeout
                );
                Err(BalancerError::StorageUnavailable(
                    "timed out waiting for the counter store".to_string(),
                ))
            }
        };

        match &result {
            Ok(variant) => {
                timer.label("outcome", "assigned").fin();
                inc(
                    CONDITION_ASSIGNMENTS_COUNTER,
                    &[("variant".to_string(), variant.to_string())],
                    1,
                );
                tracing::debug!(%variant, "assigned condition");
            }
            Err(_) => {
                timer.label("outcome", "failed").fin();
                inc(
                    ASSIGNMENT_ERRORS_COUNTER,
                    &[("reason".to_string(), "unavailable".to_string())],
                    1,
                );
            }
        }

        result
    }

    /// Creates zero counters for any variant of the experiment that has none.
    pub async fn seed(&self) -> Result<(), BalancerError> {
        timeout(
            self.store_timeout,
            self.store.seed(&self.experiment_id, &Variant::ALL),
        )
        .await
        .map_err(|_| BalancerError::StorageUnavailable("timed out seeding counters".to_string()))??;
        Ok(())
    }

    pub async fn counts(&self) -> Result<Vec<(Variant, i64)>, BalancerError> {
        Ok(self.store.counts(&self.experiment_id).await?)
    }

    pub async fn ping(&self) -> Result<(), BalancerError> {
        timeout(self.store_timeout, self.store.ping())
            .await
            .map_err(|_| BalancerError::StorageUnavailable("ping timed out".to_string()))??;
        Ok(())
    }
}
