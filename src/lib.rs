pub mod app;
pub mod classifier;
pub mod config;
pub mod history;
pub mod models;
pub mod notify;
pub mod refresher;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod tracking;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use app::App;
pub use classifier::{NotificationKind, PriceState};
pub use config::AppConfig;
pub use refresher::BatchRefresher;
pub use scheduler::{BatchRunner, BatchScheduler, RunStats};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
