use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common_types::{SessionRecord, MAX_AGE, MIN_AGE};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::identity::Participant;

#[derive(Error, Debug)]
pub enum SessionSinkError {
    #[error("invalid session record: {0}")]
    Invalid(String),
    #[error("session {0} was already written")]
    Duplicate(Uuid),
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for SessionSinkError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("session store error: {}", e);
        SessionSinkError::Unavailable(e.to_string())
    }
}

/// Checks what the server can check without trusting the client: ranges,
/// timing order and card ids. `correct` is taken as reported.
pub fn validate_record(record: &SessionRecord, experiment_id: &str) -> Result<(), SessionSinkError> {
    let invalid = |msg: &str| Err(SessionSinkError::Invalid(msg.to_string()));

    if record.experiment_id != experiment_id {
        return invalid("unknown experiment_id");
    }
    if !(0..=100).contains(&record.confidence) {
        return invalid("confidence must be between 0 and 100");
    }
    if !(MIN_AGE..=MAX_AGE).contains(&record.age) {
        return invalid(&format!("age must be between {MIN_AGE} and {MAX_AGE}"));
    }
    if record.sex.trim().is_empty() {
        return invalid("sex is required");
    }
    if record.degree.trim().is_empty() {
        return invalid("degree is required");
    }
    if !record.task_start_ms.is_finite()
        || !record.task_submit_ms.is_finite()
        || record.task_start_ms < 0.0
    {
        return invalid("task timings must be non-negative numbers");
    }
    if record.task_submit_ms < record.task_start_ms {
        return invalid("task_submit_ms is before task_start_ms");
    }
    if record.selection_changes < 0 {
        return invalid("selection_changes must not be negative");
    }

    let mut seen = HashSet::new();
    if !record.final_selection.iter().all(|card| seen.insert(*card)) {
        return invalid("final_selection contains a card twice");
    }
    if record.screen_w < 0 || record.screen_h < 0 {
        return invalid("screen size must not be negative");
    }

    Ok(())
}

/// Durable store for finished trials.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Returns once the record is durably written.
    async fn write(
        &self,
        participant: &Participant,
        record: &SessionRecord,
    ) -> Result<(), SessionSinkError>;

    async fn ping(&self) -> Result<(), SessionSinkError>;
}

pub struct PgSessionSink {
    pool: PgPool,
}

impl PgSessionSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionSink for PgSessionSink {
    #[instrument(skip_all, fields(session_id = %record.session_id))]
    async fn write(
        &self,
        participant: &Participant,
        record: &SessionRecord,
    ) -> Result<(), SessionSinkError> {
        let result = sqlx::query(
            r#"INSERT INTO sessions (
                session_id, experiment_id, user_id, condition,
                task_start_ms, task_submit_ms, selection_changes, first_card_selected,
                final_selection, correct, confidence,
                sex, age, degree,
                user_agent, screen_w, screen_h, tz
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"#,
        )
        .bind(record.session_id)
        .bind(&record.experiment_id)
        .bind(participant.id)
        .bind(record.condition.as_str())
        .bind(record.task_start_ms)
        .bind(record.task_submit_ms)
        .bind(record.selection_changes)
        .bind(record.first_card_selected.map(|card| card.as_str()))
        .bind(record.final_selection_labels())
        .bind(record.correct)
        .bind(record.confidence)
        .bind(&record.sex)
        .bind(record.age)
        .bind(&record.degree)
        .bind(&record.user_agent)
        .bind(record.screen_w)
        .bind(record.screen_h)
        .bind(&record.tz)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(SessionSinkError::Duplicate(record.session_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn ping(&self) -> Result<(), SessionSinkError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Keeps written sessions in memory; can simulate an outage.
#[derive(Clone, Default)]
pub struct MemorySessionSink {
    records: Arc<Mutex<Vec<(Participant, SessionRecord)>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemorySessionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<(Participant, SessionRecord)> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), SessionSinkError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SessionSinkError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionSink for MemorySessionSink {
    async fn write(
        &self,
        participant: &Participant,
        record: &SessionRecord,
    ) -> Result<(), SessionSinkError> {
        self.check_available()?;

        let mut records = self
            .records
            .lock()
            .map_err(|_| SessionSinkError::Unavailable("poisoned session lock".to_string()))?;
        if records
            .iter()
            .any(|(_, existing)| existing.session_id == record.session_id)
        {
            return Err(SessionSinkError::Duplicate(record.session_id));
        }
        records.push((*participant, record.clone()));

        Ok(())
    }

    async fn ping(&self) -> Result<(), SessionSinkError> {
        self.check_available()
    }
}
