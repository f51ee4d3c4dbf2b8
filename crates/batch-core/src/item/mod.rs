//! Contratos de lectura, transformación y escritura de ítems.
//!
//! - `ItemSource`: secuencia perezosa, finita y reiniciable. `next` devuelve
//!   `Ok(None)` al agotarse (no es error). `open` recibe el contexto del step
//!   para reanudar justo después del último chunk confirmado y `update`
//!   escribe la posición actual antes de cada commit.
//! - `ItemTransformer`: función pura ítem -> `Keep(salida)` | `Filter`.
//! - `ItemSink`: escribe un chunk completo de forma atómica sobre el recurso
//!   transaccional `C` que entrega el repositorio en `commit_chunk`.

pub mod memory;

use crate::errors::{SinkError, SourceError, TransformError};
use crate::model::ExecutionContext;

pub trait ItemSource<T>: Send {
    fn open(&mut self, context: &ExecutionContext) -> Result<(), SourceError> {
        let _ = context;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<T>, SourceError>;

    fn update(&mut self, context: &mut ExecutionContext) {
        let _ = context;
    }

    fn close(&mut self) {}
}

/// Resultado de transformar un ítem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformed<O> {
    Keep(O),
    Filter,
}

pub trait ItemTransformer<I, O>: Send + Sync {
    fn transform(&self, item: I) -> Result<Transformed<O>, TransformError>;
}

pub trait ItemSink<T, C>: Send {
    /// Se invoca exactamente una vez por chunk (nunca por ítem) y siempre
    /// dentro de la transacción del chunk.
    fn write(&mut self, items: &[T], conn: &mut C) -> Result<(), SinkError>;
}

pub use memory::{FnTransformer, IterSource, PassThrough, SharedVecSink};
