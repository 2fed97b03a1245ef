use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Variant;

/// Age bounds a participant must fall within, checked on both ends of the wire.
pub const MIN_AGE: i32 = 13;
pub const MAX_AGE: i32 = 120;

/// Position of a card in the task definition, independent of its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CardId {
    C1,
    C2,
    C3,
    C4,
}

impl CardId {
    pub const ALL: [CardId; 4] = [CardId::C1, CardId::C2, CardId::C3, CardId::C4];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardId::C1 => "c1",
            CardId::C2 => "c2",
            CardId::C3 => "c3",
            CardId::C4 => "c4",
        }
    }
}

/// A finished trial, as posted to `POST /sessions`.
///
/// Timings are milliseconds relative to the start of the session on the
/// participant's device. The participant id is not part of the body, the
/// server takes it from the authenticated caller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub experiment_id: String,
    pub condition: Variant,

    pub task_start_ms: f64,
    pub task_submit_ms: f64,
    pub selection_changes: i32,
    pub first_card_selected: Option<CardId>,
    pub final_selection: Vec<CardId>,
    pub correct: bool,
    pub confidence: i32,

    pub sex: String,
    pub age: i32,
    pub degree: String,

    pub user_agent: String,
    pub screen_w: i32,
    pub screen_h: i32,
    pub tz: String,
}

impl SessionRecord {
    pub fn final_selection_labels(&self) -> Vec<String> {
        self.final_selection
            .iter()
            .map(|card| card.as_str().to_string())
            .collect()
    }
}
