pub mod observation;
pub mod run_result;
pub mod tracked_item;

// Re-exports for convenience
pub use observation::*;
pub use run_result::*;
pub use tracked_item::*;
