#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use batch_core::{ItemSink, MemoryTransaction, SharedVecSink, SinkError};

pub type Tx = MemoryTransaction;

pub fn numbers(n: u64) -> Vec<u64> {
    (1..=n).collect()
}

/// Sink en memoria que falla en las llamadas indicadas (1-based).
pub struct FlakySink<T> {
    pub inner: SharedVecSink<T>,
    pub calls: Arc<AtomicUsize>,
    failing: Vec<usize>,
}

impl<T: Clone> FlakySink<T> {
    pub fn new(failing: Vec<usize>) -> Self {
        Self { inner: SharedVecSink::new(),
               calls: Arc::new(AtomicUsize::new(0)),
               failing }
    }

    pub fn handle(&self) -> (SharedVecSink<T>, Arc<AtomicUsize>) {
        (self.inner.clone(), Arc::clone(&self.calls))
    }
}

impl<T: Clone + Send + 'static> ItemSink<T, Tx> for FlakySink<T> {
    fn write(&mut self, items: &[T], tx: &mut Tx) -> Result<(), SinkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.contains(&call) {
            return Err(SinkError::Write(format!("injected failure on call {call}")));
        }
        self.inner.write(items, tx)
    }
}
