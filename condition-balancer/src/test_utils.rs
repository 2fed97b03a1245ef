use common_types::{CardId, SessionRecord, Variant};
use uuid::Uuid;

/// A valid, correctly answered trial for `experiment_id`.
pub fn sample_session_record(experiment_id: &str) -> SessionRecord {
    SessionRecord {
        session_id: Uuid::new_v4(),
        experiment_id: experiment_id.to_string(),
        condition: Variant::B,
        task_start_ms: 1520.5,
        task_submit_ms: 48211.0,
        selection_changes: 3,
        first_card_selected: Some(CardId::C1),
        final_selection: vec![CardId::C1, CardId::C4],
        correct: true,
        confidence: 72,
        sex: "female".to_string(),
        age: 29,
        degree: "bachelor".to_string(),
        user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
        screen_w: 1920,
        screen_h: 1080,
        tz: "Europe/Berlin".to_string(),
    }
}
