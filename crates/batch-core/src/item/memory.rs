//! Implementaciones en memoria de los contratos de ítems.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use super::{ItemSink, ItemSource, ItemTransformer, Transformed};
use crate::constants::SOURCE_OFFSET_KEY;
use crate::errors::{SinkError, SourceError, TransformError};
use crate::model::ExecutionContext;
use crate::repo::MemoryTransaction;

/// Fuente sobre un vector de resultados. Cada posición consumida (válida o
/// errónea) avanza el offset que se persiste en el contexto del step.
pub struct IterSource<T> {
    records: Vec<Result<T, SourceError>>,
    position: usize,
}

impl<T: Clone + Send> IterSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self::from_results(items.into_iter().map(Ok).collect())
    }

    pub fn from_results(records: Vec<Result<T, SourceError>>) -> Self {
        Self { records, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl<T: Clone + Send> ItemSource<T> for IterSource<T> {
    fn open(&mut self, context: &ExecutionContext) -> Result<(), SourceError> {
        let offset = context.get_u64(SOURCE_OFFSET_KEY).unwrap_or(0) as usize;
        if offset > self.records.len() {
            return Err(SourceError::Unreadable(format!("offset {offset} beyond {} records", self.records.len())));
        }
        self.position = offset;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<T>, SourceError> {
        let Some(record) = self.records.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        record.clone().map(Some)
    }

    fn update(&mut self, context: &mut ExecutionContext) {
        context.put(SOURCE_OFFSET_KEY, self.position as u64);
    }
}

/// Transformador a partir de una clausura.
pub struct FnTransformer<I, O, F> {
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FnTransformer<I, O, F>
    where F: Fn(I) -> Result<Transformed<O>, TransformError> + Send + Sync
{
    pub fn new(f: F) -> Self {
        Self { f, _types: PhantomData }
    }
}

impl<I, O, F> ItemTransformer<I, O> for FnTransformer<I, O, F>
    where F: Fn(I) -> Result<Transformed<O>, TransformError> + Send + Sync
{
    fn transform(&self, item: I) -> Result<Transformed<O>, TransformError> {
        (self.f)(item)
    }
}

/// Transformador identidad.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl<T> ItemTransformer<T, T> for PassThrough {
    fn transform(&self, item: T) -> Result<Transformed<T>, TransformError> {
        Ok(Transformed::Keep(item))
    }
}

/// Destino en memoria compartido. Las escrituras se difieren al commit de la
/// `MemoryTransaction`: si la transacción se descarta no queda rastro.
pub struct SharedVecSink<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for SharedVecSink<T> {
    fn clone(&self) -> Self {
        Self { items: Arc::clone(&self.items) }
    }
}

impl<T> Default for SharedVecSink<T> {
    fn default() -> Self {
        Self { items: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl<T: Clone> SharedVecSink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + 'static> ItemSink<T, MemoryTransaction> for SharedVecSink<T> {
    fn write(&mut self, items: &[T], tx: &mut MemoryTransaction) -> Result<(), SinkError> {
        let target = Arc::clone(&self.items);
        let batch = items.to_vec();
        tx.on_commit(move || {
              target.lock().unwrap_or_else(|p| p.into_inner()).extend(batch);
          });
        Ok(())
    }
}
