use thiserror::Error;

/// Main error type for the HPL Sweep system
#[derive(Error, Debug)]
pub enum HsError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("Scheduler unavailable: {message}")]
    SchedulerUnavailable { message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Caller mistakes. Fatal to the single call, never partially applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("malformed range {start}..={end} step {step}: {message}")]
    MalformedRange {
        start: u64,
        end: u64,
        step: u64,
        message: String,
    },

    #[error("no values given for {parameter}")]
    EmptySet { parameter: String },

    #[error("combination cap must be at least 1, got {cap}")]
    InvalidCap { cap: usize },

    #[error("total process count must be at least 1, got {total}")]
    InvalidProcessCount { total: u64 },

    #[error("sweep space is too large to enumerate: {message}")]
    SpaceTooLarge { message: String },

    #[error("a sweep needs at least one configuration")]
    EmptySweep,

    #[error("{count} configurations exceed the cap of {cap}")]
    TooManyConfigurations { count: usize, cap: usize },

    #[error("configuration id {id} appears more than once")]
    DuplicateConfigurationId { id: u32 },

    #[error("invalid resource spec: {message}")]
    InvalidResources { message: String },
}

/// Errors reported by a scheduler adapter for a single call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The transport or the scheduler itself cannot be reached. Affects every
    /// call in the batch, not just this one.
    #[error("scheduler unreachable: {message}")]
    Unavailable { message: String },

    #[error("submission rejected: {reason}")]
    Rejected { reason: String },

    #[error("job not known to the scheduler: {job_id}")]
    JobNotFound { job_id: String },

    #[error("status query failed: {message}")]
    QueryFailed { message: String },

    #[error("{adapter} does not support {operation}")]
    Unsupported { adapter: String, operation: String },
}

impl SchedulerError {
    /// Whether this error invalidates the whole batch of remote calls.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<SchedulerError> for HsError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Unavailable { message } => HsError::SchedulerUnavailable { message },
            other => HsError::Internal(other.to_string()),
        }
    }
}

/// Persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sweep not found: {sweep_id}")]
    NotFound { sweep_id: String },

    #[error("sweep already exists: {sweep_id}")]
    AlreadyExists { sweep_id: String },

    #[error("stored data is corrupted: {message}")]
    Corrupted { message: String },

    #[error("store backend failure: {message}")]
    Backend { message: String },
}

/// Result type alias for HPL Sweep operations
pub type HsResult<T> = Result<T, HsError>;

/// Result alias for a single scheduler call.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::HsError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HsError::Config(format!($($arg)*))
    };
}
