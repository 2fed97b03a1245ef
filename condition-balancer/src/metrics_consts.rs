pub const CONDITION_ASSIGNMENTS_COUNTER: &str = "condition_assignments_total";
pub const ASSIGNMENT_ERRORS_COUNTER: &str = "condition_assignment_errors_total";
pub const ASSIGNMENT_TIME: &str = "condition_assignment_duration_ms";
pub const ANONYMOUS_SIGNINS_COUNTER: &str = "anonymous_signins_total";
pub const SESSIONS_WRITTEN_COUNTER: &str = "sessions_written_total";
pub const SESSION_WRITE_ERRORS_COUNTER: &str = "session_write_errors_total";
