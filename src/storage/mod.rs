//! Persistent storage for settings and workflow documents

mod schema;
mod store;

pub use store::{SqliteStore, WorkflowSummary};
