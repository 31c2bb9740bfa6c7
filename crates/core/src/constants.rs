/// Constants used throughout the unwound codebase
// Environment variable names
pub const UNWOUND_LOG_VAR: &str = "UNWOUND_LOG";
pub const UNWOUND_DEBUG_LOCK_VAR: &str = "UNWOUND_DEBUG_LOCK";
pub const UNWOUND_IGNORE_SIGPIPE_VAR: &str = "UNWOUND_IGNORE_SIGPIPE";

// Defaults
pub const DEFAULT_LOG_FILTER: &str = "warn";
pub const DEFAULT_DEBUG_LOCK_PATH: &str = "/tmp/unwound.lock";
pub const DEFAULT_PROGRAM_NAME: &str = "unwound";

// Reported when allocation fails; must never require formatting.
pub const NO_MEMORY_MESSAGE: &str = "no memory";

// Exit status of a process whose top-level protected call unwound
pub const FAILURE_EXIT_STATUS: u8 = 1;
