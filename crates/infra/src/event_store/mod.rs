//! Append-only event store boundary.
//!
//! Storage-agnostic contract for appending and loading aggregate streams, plus
//! the in-memory implementation used by tests and single-process deployments.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
