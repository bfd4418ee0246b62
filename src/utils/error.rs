use thiserror::Error;

/// Run-level and application errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Selection failed: {0}")]
    Selection(#[source] StoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] DispatchError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Batch run timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("A batch run is already in progress")]
    Busy,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

/// Failure to obtain a usable observation for one item.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {locator}")]
    Status { locator: String, status: u16 },

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Malformed observation: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Errors worth another attempt. Anything derived from page content is not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::InvalidLocator(_) | FetchError::Parse { .. } | FetchError::Malformed(_) => {
                false
            }
        }
    }
}

impl From<validator::ValidationErrors> for FetchError {
    fn from(err: validator::ValidationErrors) -> Self {
        FetchError::Malformed(format!("{}", err))
    }
}

/// Failure to deliver a notification.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid address {address}: {message}")]
    Address { address: String, message: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("No recipients")]
    NoRecipients,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record {key}: {message}")]
    Corrupt { key: String, message: String },

    #[error("History for {key} would shrink from {stored} to {proposed} entries")]
    HistoryRegression {
        key: String,
        stored: usize,
        proposed: usize,
    },

    #[error("History for {key} differs from the stored entry at position {position}")]
    HistoryDiverged { key: String, position: usize },

    #[error("Not found: {key}")]
    NotFound { key: String },
}

/// Per-item failure recorded in a run summary.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("persist failed: {0}")]
    Persist(#[from] StoreError),
}

impl ItemError {
    pub fn stage(&self) -> &'static str {
        match self {
            ItemError::Fetch(_) => "fetch",
            ItemError::Persist(_) => "persist",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
