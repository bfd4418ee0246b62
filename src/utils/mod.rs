pub mod error;

pub use error::{AppError, DispatchError, FetchError, ItemError, StoreError};
