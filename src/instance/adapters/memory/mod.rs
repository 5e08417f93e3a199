//! In-memory adapters for deterministic tests and dry runs.

mod registry;
mod runtime;
mod workspace;

pub use registry::InMemoryRegistryStore;
pub use runtime::InMemoryStackRuntime;
pub use workspace::InMemoryWorkspace;
