//! Keyed job record store persisted as `jobs.json`.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{JobPage, JobStore, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, STORE_FILE_NAME};
