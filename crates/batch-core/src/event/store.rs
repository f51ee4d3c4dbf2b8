use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{BatchEvent, BatchEventKind};
use crate::errors::BatchError;

/// Almacenamiento de eventos append-only. Se comparte entre hilos (el
/// listener que lo alimenta puede vivir en un job lanzado en segundo plano).
pub trait EventStore: Send + Sync {
    /// Agrega un evento y devuelve el evento completo (con seq y ts).
    fn append_kind(&self, job_execution_id: Uuid, kind: BatchEventKind) -> Result<BatchEvent, BatchError>;
    /// Eventos de una ejecución en orden ascendente de seq.
    fn list(&self, job_execution_id: Uuid) -> Result<Vec<BatchEvent>, BatchError>;
}

#[derive(Default)]
pub struct InMemoryEventStore {
    inner: DashMap<Uuid, Vec<BatchEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append_kind(&self, job_execution_id: Uuid, kind: BatchEventKind) -> Result<BatchEvent, BatchError> {
        let mut events = self.inner.entry(job_execution_id).or_default();
        let ev = BatchEvent { seq: events.len() as u64,
                              job_execution_id,
                              kind,
                              ts: Utc::now() };
        events.push(ev.clone());
        Ok(ev)
    }

    fn list(&self, job_execution_id: Uuid) -> Result<Vec<BatchEvent>, BatchError> {
        Ok(self.inner.get(&job_execution_id).map(|v| v.value().clone()).unwrap_or_default())
    }
}
