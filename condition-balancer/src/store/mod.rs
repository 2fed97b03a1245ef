use std::collections::BTreeMap;

use async_trait::async_trait;
use common_types::Variant;
use thiserror::Error;

use crate::selection::TieBreak;

pub mod memory;
pub mod postgres;
pub mod redis;

pub use self::memory::MemoryCounterStore;
pub use self::postgres::PgCounterStore;
pub use self::redis::RedisCounterStore;

#[derive(Error, Debug)]
pub enum CounterStoreError {
    #[error("counters for experiment {0} are not seeded")]
    NotSeeded(String),

    #[error("counter row references unknown variant: {0}")]
    UnknownVariant(String),

    #[error("Pg error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Everything the store needs to run one read-select-increment.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentRequest<'a> {
    pub experiment_id: &'a str,
    pub variants: &'a [Variant],
    pub tie_break: TieBreak,
    pub tie_seed: u32,
}

/// Durable per-variant assignment counters.
///
/// `assign_next` is the only way to mutate counts. Implementations must run
/// the read of every counter, the selection and the increment as a single
/// atomic unit, and must leave counts untouched when they return an error.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn assign_next(&self, request: &AssignmentRequest<'_>)
        -> Result<Variant, CounterStoreError>;

    /// Creates a zero counter for every variant that has none yet. Existing
    /// counts are left alone.
    async fn seed(&self, experiment_id: &str, variants: &[Variant])
        -> Result<(), CounterStoreError>;

    /// Current counts in variant order. For monitoring and tests, never feed
    /// this into a selection.
    async fn counts(&self, experiment_id: &str) -> Result<Vec<(Variant, i64)>, CounterStoreError>;

    async fn ping(&self) -> Result<(), CounterStoreError>;
}

/// Turns raw `(variant, count)` rows into counts for exactly `variants`, in
/// variant order. Rows for variants outside `variants` are ignored.
pub fn collect_counts<I>(
    experiment_id: &str,
    rows: I,
    variants: &[Variant],
) -> Result<Vec<(Variant, i64)>, CounterStoreError>
where
    I: IntoIterator<Item = (String, i64)>,
{
    let mut stored = BTreeMap::new();
    for (name, count) in rows {
        let variant = name
            .parse::<Variant>()
            .map_err(|_| CounterStoreError::UnknownVariant(name.clone()))?;
        stored.insert(variant, count);
    }

    let mut counts = Vec::with_capacity(variants.len());
    for variant in variants {
        match stored.get(variant) {
            Some(count) => counts.push((*variant, *count)),
            None => return Err(CounterStoreError::NotSeeded(experiment_id.to_string())),
        }
    }
    counts.sort_by_key(|(variant, _)| *variant);

    Ok(counts)
}
