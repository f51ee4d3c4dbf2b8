//! Bitácora append-only de eventos de ejecución.

mod listener;
mod store;
mod types;

pub use listener::EventLogListener;
pub use store::{EventStore, InMemoryEventStore};
pub use types::{BatchEvent, BatchEventKind};
