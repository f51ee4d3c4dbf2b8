//! Procesamiento orientado a chunks: lectura hasta N registros,
//! transformación, escritura y commit atómico.

mod executor;
mod policy;

pub use executor::{ChunkExecutor, ChunkOutcome, ChunkState};
pub use policy::{RetryPolicy, SkipPolicy};

/// Acumulador de un ciclo. `read + read_skips` es el número de registros
/// consumidos de la fuente y nunca supera el tamaño del chunk.
#[derive(Debug)]
pub struct Chunk<I, O> {
    pub inputs: Vec<I>,
    pub outputs: Vec<O>,
    pub read: u64,
    pub read_skips: u64,
    pub process_skips: u64,
    pub filtered: u64,
    pub exhausted: bool,
}

impl<I, O> Chunk<I, O> {
    pub fn with_capacity(size: usize) -> Self {
        Self { inputs: Vec::with_capacity(size),
               outputs: Vec::with_capacity(size),
               read: 0,
               read_skips: 0,
               process_skips: 0,
               filtered: 0,
               exhausted: false }
    }

    pub fn consumed(&self) -> u64 {
        self.read + self.read_skips
    }

    pub fn skips(&self) -> u64 {
        self.read_skips + self.process_skips
    }
}
