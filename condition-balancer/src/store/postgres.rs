use std::time::Duration;

use async_trait::async_trait;
use common_types::Variant;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::instrument;

use super::{collect_counts, AssignmentRequest, CounterStore, CounterStoreError};
use crate::selection::pick_least_assigned;

/// Builds a lazily connecting pool: nothing touches the network until the
/// first query.
pub fn get_pool(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .test_before_acquire(true)
        .connect_lazy(url)
}

/// Counters in the `condition_counts` table, one row per experiment and variant.
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    /// Locks every counter row of the experiment (in variant order, so
    /// concurrent transactions queue up instead of deadlocking), picks, and
    /// bumps one row before committing. A transaction that waited on the locks
    /// reads the counts committed by the one ahead of it.
    #[instrument(skip_all, fields(experiment_id = request.experiment_id))]
    async fn assign_next(
        &self,
        request: &AssignmentRequest<'_>,
    ) -> Result<Variant, CounterStoreError> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"SELECT variant, assigned FROM condition_counts
            WHERE experiment_id = $1
            ORDER BY variant
            FOR UPDATE"#,
        )
        .bind(request.experiment_id)
        .fetch_all(&mut *tx)
        .await?;

        let counts = collect_counts(request.experiment_id, rows, request.variants)?;
        let picked = pick_least_assigned(&counts, request.tie_break, request.tie_seed)
            .ok_or_else(|| CounterStoreError::NotSeeded(request.experiment_id.to_string()))?;

        let updated = sqlx::query(
            r#"UPDATE condition_counts SET assigned = assigned + 1
            WHERE experiment_id = $1 AND variant = $2"#,
        )
        .bind(request.experiment_id)
        .bind(picked.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            // Dropping the transaction rolls it back
            return Err(CounterStoreError::NotSeeded(
                request.experiment_id.to_string(),
            ));
        }

        tx.commit().await?;

        Ok(picked)
    }

    async fn seed(
        &self,
        experiment_id: &str,
        variants: &[Variant],
    ) -> Result<(), CounterStoreError> {
        let names: Vec<String> = variants.iter().map(|v| v.to_string()).collect();

        sqlx::query(
            r#"INSERT INTO condition_counts (experiment_id, variant, assigned)
            SELECT $1, variant, 0 FROM UNNEST($2::text[]) AS variant
            ON CONFLICT (experiment_id, variant) DO NOTHING"#,
        )
        .bind(experiment_id)
        .bind(&names)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn counts(&self, experiment_id: &str) -> Result<Vec<(Variant, i64)>, CounterStoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT variant, assigned FROM condition_counts WHERE experiment_id = $1 ORDER BY variant",
        )
        .bind(experiment_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for (name, count) in rows {
            let variant = name
                .parse::<Variant>()
                .map_err(|_| CounterStoreError::UnknownVariant(name.clone()))?;
            counts.push((variant, count));
        }
        Ok(counts)
    }

    async fn ping(&self) -> Result<(), CounterStoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
