use std::sync::Arc;

use common_types::{AnonymousIdentity, CardId, SessionRecord, Variant};
use tokio::time::Instant;
use tracing::instrument;
use uuid::Uuid;

use crate::client::{BalancerClient, ConditionSource, IdentitySource, SessionSink};
use crate::completion::{CompletionMarker, FileCompletionMarker};
use crate::config::ExperimentClientConfig;
use crate::demographics::{validate_confidence, Demographics};
use crate::error::{AssignmentError, ClientSetupError, CompletionError, SaveError, SessionError};
use crate::task::{task_for, Task};

pub const START_ERROR: &str = "Could not start the experiment. Please try again.";
pub const SAVE_ERROR: &str = "Save failed. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Consent,
    Task,
    Confidence,
    Demographics,
    Debrief,
}

/// What the record reports about the participant's device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub user_agent: String,
    pub screen_w: i32,
    pub screen_h: i32,
    pub tz: String,
}

/// Everything one run through the stages collects. Replaced wholesale on restart.
#[derive(Debug)]
struct Trial {
    session_id: Uuid,
    stage: Stage,
    started_at: Instant,
    condition: Option<Variant>,

    task_start_ms: Option<f64>,
    task_submit_ms: Option<f64>,
    selection: Vec<CardId>,
    selection_changes: i32,
    first_card_selected: Option<CardId>,
    correct: Option<bool>,
    confidence: Option<i32>,

    start_error: Option<String>,
    save_error: Option<String>,
}

impl Trial {
    fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            stage: Stage::Consent,
            started_at: Instant::now(),
            condition: None,
            task_start_ms: None,
            task_submit_ms: None,
            selection: vec![],
            selection_changes: 0,
            first_card_selected: None,
            correct: None,
            confidence: None,
            start_error: None,
            save_error: None,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64() * 1000.0
    }
}

/// Drives one participant through consent, task, confidence, demographics
/// and debrief.
///
/// The condition is requested exactly once per trial, when the participant
/// consents. If that fails the controller stays at consent with
/// [`START_ERROR`] showing; it never falls back to a default condition.
/// The trial only reaches debrief after the sink has stored the record.
pub struct SessionController {
    identity_source: Arc<dyn IdentitySource>,
    conditions: Arc<dyn ConditionSource>,
    sink: Arc<dyn SessionSink>,
    marker: Arc<dyn CompletionMarker>,
    experiment_id: String,
    device: DeviceInfo,

    identity: Option<AnonymousIdentity>,
    trial: Trial,
}

impl SessionController {
    pub fn new<C>(
        client: Arc<C>,
        marker: Arc<dyn CompletionMarker>,
        experiment_id: String,
        device: DeviceInfo,
    ) -> Self
    where
        C: IdentitySource + ConditionSource + SessionSink + 'static,
    {
        Self {
            identity_source: client.clone(),
            conditions: client.clone(),
            sink: client,
            marker,
            experiment_id,
            device,
            identity: None,
            trial: Trial::new(),
        }
    }

    /// Talks to the balancer over HTTP and keeps the completion marker in
    /// `completion_marker_dir`.
    pub fn from_config(
        config: &ExperimentClientConfig,
        device: DeviceInfo,
    ) -> Result<Self, ClientSetupError> {
        let client = Arc::new(BalancerClient::from_config(config)?);
        let marker = Arc::new(FileCompletionMarker::new(&config.completion_marker_dir));

        Ok(Self::new(
            client,
            marker,
            config.experiment_id.clone(),
            device,
        ))
    }

    pub fn stage(&self) -> Stage {
        self.trial.stage
    }

    pub fn session_id(&self) -> Uuid {
        self.trial.session_id
    }

    pub fn participant(&self) -> Option<&AnonymousIdentity> {
        self.identity.as_ref()
    }

    pub fn condition(&self) -> Option<Variant> {
        self.trial.condition
    }

    /// The task shown for the assigned condition, once there is one.
    pub fn task(&self) -> Option<&'static Task> {
        self.trial.condition.map(task_for)
    }

    pub fn selection(&self) -> &[CardId] {
        &self.trial.selection
    }

    pub fn selection_changes(&self) -> i32 {
        self.trial.selection_changes
    }

    pub fn first_card_selected(&self) -> Option<CardId> {
        self.trial.first_card_selected
    }

    pub fn correct(&self) -> Option<bool> {
        self.trial.correct
    }

    pub fn confidence(&self) -> Option<i32> {
        self.trial.confidence
    }

    pub fn start_error(&self) -> Option<&str> {
        self.trial.start_error.as_deref()
    }

    pub fn save_error(&self) -> Option<&str> {
        self.trial.save_error.as_deref()
    }

    pub fn already_completed(&self) -> Result<bool, CompletionError> {
        self.marker.is_marked()
    }

    fn expect_stage(&self, stage: Stage, action: &'static str) -> Result<(), SessionError> {
        if self.trial.stage != stage {
            return Err(SessionError::WrongStage {
                action,
                stage: self.trial.stage,
            });
        }
        Ok(())
    }

    async fn ensure_identity(&mut self) -> Result<String, AssignmentError> {
        if let Some(identity) = &self.identity {
            return Ok(identity.token.clone());
        }

        let identity = self.identity_source.sign_in_anonymously().await?;
        tracing::info!(participant_id = %identity.participant_id, "signed in anonymously");
        let token = identity.token.clone();
        self.identity = Some(identity);
        Ok(token)
    }

    /// Signs in if needed and asks the balancer for a condition.
    #[instrument(skip_all, fields(session_id = %self.trial.session_id))]
    pub async fn start(&mut self, consent: bool) -> Result<Variant, SessionError> {
        self.expect_stage(Stage::Consent, "start")?;
        if !consent {
            return Err(SessionError::ConsentRequired);
        }
        self.trial.start_error = None;

        let assigned = match self.ensure_identity().await {
            Ok(token) => self.conditions.assign_condition(&token).await,
            Err(e) => Err(e),
        };

        let condition = match assigned {
            Ok(condition) => condition,
            Err(e) => {
                tracing::warn!("could not start the experiment: {}", e);
                if e == AssignmentError::Unauthorized {
                    // Token no longer accepted, sign in again on the next try
                    self.identity = None;
                }
                self.trial.start_error = Some(START_ERROR.to_string());
                return Err(e.into());
            }
        };

        tracing::info!(%condition, "condition assigned");
        self.trial.condition = Some(condition);
        self.trial.task_start_ms = Some(self.trial.elapsed_ms());
        self.trial.stage = Stage::Task;

        Ok(condition)
    }

    /// Selects or deselects a card. Every call counts as a change.
    pub fn toggle_card(&mut self, card: CardId) -> Result<(), SessionError> {
        self.expect_stage(Stage::Task, "toggle a card")?;

        let trial = &mut self.trial;
        if let Some(position) = trial.selection.iter().position(|c| *c == card) {
            trial.selection.remove(position);
        } else {
            trial.selection.push(card);
        }
        trial.first_card_selected.get_or_insert(card);
        trial.selection_changes += 1;

        Ok(())
    }

    /// Freezes the selection and grades it. Returns whether it was correct.
    pub fn submit_task(&mut self) -> Result<bool, SessionError> {
        self.expect_stage(Stage::Task, "submit the task")?;

        let task = self
            .task()
            .ok_or(SessionError::WrongStage {
                action: "submit the task",
                stage: Stage::Consent,
            })?;
        let correct = task.is_correct(&self.trial.selection);

        self.trial.task_submit_ms = Some(self.trial.elapsed_ms());
        self.trial.correct = Some(correct);
        self.trial.stage = Stage::Confidence;

        Ok(correct)
    }

    pub fn submit_confidence(&mut self, confidence: i32) -> Result<(), SessionError> {
        self.expect_stage(Stage::Confidence, "rate confidence")?;
        validate_confidence(confidence)?;

        self.trial.confidence = Some(confidence);
        self.trial.save_error = None;
        self.trial.stage = Stage::Demographics;

        Ok(())
    }

    /// Validates the answers and writes the finished record. Moves on to
    /// debrief only once the write is acknowledged; on failure the
    /// participant can submit again.
    #[instrument(skip_all, fields(session_id = %self.trial.session_id))]
    pub async fn submit_demographics(
        &mut self,
        demographics: Demographics,
    ) -> Result<(), SessionError> {
        self.expect_stage(Stage::Demographics, "submit demographics")?;
        demographics.validate()?;
        self.trial.save_error = None;

        let record = self.build_record(demographics)?;

        let saved = match self.identity.as_ref() {
            Some(identity) => self.sink.write_session(&identity.token, &record).await,
            None => Err(SaveError::Unauthorized),
        };
        if let Err(e) = saved {
            tracing::warn!("failed to save session: {}", e);
            self.trial.save_error = Some(SAVE_ERROR.to_string());
            return Err(e.into());
        }

        if let Err(e) = self.marker.mark() {
            // The record is stored, the marker only discourages repeats
            tracing::warn!("failed to set completion marker: {}", e);
        }
        tracing::info!(condition = %record.condition, correct = record.correct, "session saved");
        self.trial.stage = Stage::Debrief;

        Ok(())
    }

    fn build_record(&self, demographics: Demographics) -> Result<SessionRecord, SessionError> {
        let trial = &self.trial;
        let missing = || SessionError::WrongStage {
            action: "build the session record",
            stage: trial.stage,
        };

        Ok(SessionRecord {
            session_id: trial.session_id,
            experiment_id: self.experiment_id.clone(),
            condition: trial.condition.ok_or_else(missing)?,
            task_start_ms: trial.task_start_ms.ok_or_else(missing)?,
            task_submit_ms: trial.task_submit_ms.ok_or_else(missing)?,
            selection_changes: trial.selection_changes,
            first_card_selected: trial.first_card_selected,
            // Click order, toggling keeps it free of duplicates
            final_selection: trial.selection.clone(),
            correct: trial.correct.ok_or_else(missing)?,
            confidence: trial.confidence.ok_or_else(missing)?,
            sex: demographics.sex,
            age: demographics.age,
            degree: demographics.degree,
            user_agent: self.device.user_agent.clone(),
            screen_w: self.device.screen_w,
            screen_h: self.device.screen_h,
            tz: self.device.tz.clone(),
        })
    }

    /// Starts a fresh trial for the same participant. The next `start`
    /// requests a new condition.
    pub fn restart(&mut self) -> Result<(), SessionError> {
        self.expect_stage(Stage::Debrief, "restart")?;
        self.trial = Trial::new();
        Ok(())
    }
}
