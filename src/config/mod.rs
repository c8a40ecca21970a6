//! Configuration types and loading for flowcabal

mod connection;
mod loader;

pub use connection::{ApiConnection, ApiParameters, DEFAULT_ENDPOINT, DEFAULT_MODEL};
pub use loader::{Defaults, FlowConfig, StorageConfig, load_workflow_file};
