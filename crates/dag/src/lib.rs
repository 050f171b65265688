//! Task graph execution for Switchyard.
//!
//! Tasks persist through a [`switchyard_core::task::TaskRepo`]; the
//! [`DagExecutor`] runs a session's ready tasks in parallel rounds with a
//! barrier between waves.

pub mod executor;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use executor::{DagExecutor, RunSummary, MAX_ROUNDS};
pub use store::InMemoryTaskRepo;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTaskRepo;
