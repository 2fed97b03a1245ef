mod session;
mod variant;

pub use session::{CardId, SessionRecord, MAX_AGE, MIN_AGE};
pub use variant::Variant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body returned by a successful `POST /assign-condition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssignResponse {
    pub condition: Variant,
}

/// Machine-readable reason attached to every non-2xx response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    Unavailable,
    BadRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub detail: String,
}

/// An anonymous participant, as handed out by `POST /auth/anonymous`.
///
/// The token is only ever returned once; the server keeps a hash of it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnonymousIdentity {
    pub participant_id: Uuid,
    pub token: String,
}
