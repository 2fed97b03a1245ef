use thiserror::Error;

use crate::controller::Stage;

/// Why no condition (or identity) could be obtained from the balancer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("not signed in or token rejected")]
    Unauthorized,
    #[error("balancer storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("unexpected balancer response: {0}")]
    MalformedResponse(String),
}

/// Why a finished session could not be written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    #[error("not signed in or token rejected")]
    Unauthorized,
    #[error("session rejected: {0}")]
    Rejected(String),
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("sex is required")]
    SexRequired,
    #[error("degree is required")]
    DegreeRequired,
    #[error("age must be between 13 and 120, got {0}")]
    AgeOutOfRange(i32),
    #[error("confidence must be between 0 and 100, got {0}")]
    ConfidenceOutOfRange(i32),
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("completion marker io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("cannot {action} while in stage {stage:?}")]
    WrongStage { action: &'static str, stage: Stage },
    #[error("consent is required to start")]
    ConsentRequired,
    #[error("could not start the experiment: {0}")]
    StartFailed(#[from] AssignmentError),
    #[error("could not save the session: {0}")]
    SaveFailed(#[from] SaveError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Error, Debug)]
pub enum ClientSetupError {
    #[error("invalid balancer url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}
