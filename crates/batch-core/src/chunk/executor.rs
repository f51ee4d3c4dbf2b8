//! Máquina de estados del procesamiento por chunks.
//!
//! ```text
//! Reading -> Transforming -> Writing -> Committing -> Reading | Done
//! Reading -> Done            (ningún registro consumido)
//! *       -> Failed          (error no saltable, reintentos agotados)
//! ```
//!
//! La escritura y el commit comparten una transacción del repositorio: el
//! executor prepara una copia de la `StepExecution` con los contadores y el
//! offset del chunk, el sink escribe dentro de `commit_chunk` y la copia sólo
//! se adopta si el commit se confirma. Tras un rollback los contadores quedan
//! como estaban antes del chunk (salvo `rollback_count`).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use log::{debug, error, info, trace, warn};

use super::{Chunk, RetryPolicy, SkipPolicy};
use crate::errors::{BatchError, TransformError};
use crate::item::{ItemSink, ItemSource, ItemTransformer, Transformed};
use crate::listener::{self, panic_message, SharedListener};
use crate::model::StepExecution;
use crate::repo::JobRepository;

#[derive(Debug)]
pub enum ChunkState {
    Reading,
    Transforming,
    Writing,
    Committing(StepExecution),
    Done,
    Failed(BatchError),
}

impl ChunkState {
    pub fn name(&self) -> &'static str {
        match self {
            ChunkState::Reading => "READING",
            ChunkState::Transforming => "TRANSFORMING",
            ChunkState::Writing => "WRITING",
            ChunkState::Committing(_) => "COMMITTING",
            ChunkState::Done => "DONE",
            ChunkState::Failed(_) => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Completed,
    Stopped,
}

pub struct ChunkExecutor<'a, I, O, C> {
    pub source: &'a mut Box<dyn ItemSource<I>>,
    pub transformer: &'a dyn ItemTransformer<I, O>,
    pub sink: &'a mut Box<dyn ItemSink<O, C>>,
    pub chunk_size: usize,
    pub skip_policy: SkipPolicy,
    pub retry_policy: RetryPolicy,
    pub listeners: &'a [SharedListener],
    pub strict_listeners: bool,
}

impl<'a, I, O, C> ChunkExecutor<'a, I, O, C> {
    /// Procesa chunks hasta agotar la fuente, fallar o detectar una petición
    /// de stop después de un commit.
    pub fn run(&mut self,
               execution: &mut StepExecution,
               repo: &dyn JobRepository<Conn = C>)
               -> Result<ChunkOutcome, BatchError> {
        let mut chunk = Chunk::with_capacity(self.chunk_size);
        let mut state = ChunkState::Reading;
        loop {
            trace!("chunk:state step={} state={}", execution.step_name, state.name());
            state = match state {
                ChunkState::Reading => match self.read(&mut chunk, execution) {
                    Ok(()) if chunk.consumed() == 0 => ChunkState::Done,
                    Ok(()) => ChunkState::Transforming,
                    Err(e) => ChunkState::Failed(e),
                },
                ChunkState::Transforming => match self.transform(&mut chunk, execution) {
                    Ok(()) => ChunkState::Writing,
                    Err(e) => ChunkState::Failed(e),
                },
                ChunkState::Writing => match self.write(&chunk, execution, repo) {
                    Ok(committed) => ChunkState::Committing(committed),
                    Err(e) => ChunkState::Failed(e),
                },
                ChunkState::Committing(committed) => {
                    *execution = committed;
                    debug!("chunk:commit step={} commit={} read={} write={} filter={} skip={}",
                           execution.step_name,
                           execution.commit_count,
                           execution.read_count,
                           execution.write_count,
                           execution.filter_count,
                           execution.skip_count());
                    let exhausted = chunk.exhausted;
                    chunk = Chunk::with_capacity(self.chunk_size);
                    let committed: &StepExecution = execution;
                    let notified = listener::notify_all(self.listeners,
                                                        "after_chunk",
                                                        self.strict_listeners,
                                                        |l| l.after_chunk(committed));
                    match notified.and_then(|_| repo.is_stop_requested(execution.job_execution_id)) {
                        Ok(true) => {
                            info!("chunk:stop step={} commit={}", execution.step_name, execution.commit_count);
                            return Ok(ChunkOutcome::Stopped);
                        }
                        Ok(false) if exhausted => ChunkState::Done,
                        Ok(false) => ChunkState::Reading,
                        Err(e) => ChunkState::Failed(e),
                    }
                }
                ChunkState::Done => return Ok(ChunkOutcome::Completed),
                ChunkState::Failed(e) => {
                    error!("chunk:failed step={} err={}", execution.step_name, e);
                    return Err(e);
                }
            };
        }
    }

    fn read(&mut self, chunk: &mut Chunk<I, O>, execution: &StepExecution) -> Result<(), BatchError> {
        while chunk.consumed() < self.chunk_size as u64 {
            match self.source.next() {
                Ok(Some(item)) => {
                    chunk.inputs.push(item);
                    chunk.read += 1;
                }
                Ok(None) => {
                    chunk.exhausted = true;
                    break;
                }
                Err(e) => {
                    let err = BatchError::from(e);
                    self.skip_policy.check(&err, execution.skip_count() + chunk.skips())?;
                    warn!("chunk:skip-read step={} err={}", execution.step_name, err);
                    chunk.read_skips += 1;
                }
            }
        }
        Ok(())
    }

    fn transform(&mut self, chunk: &mut Chunk<I, O>, execution: &StepExecution) -> Result<(), BatchError> {
        let transformer = self.transformer;
        for item in std::mem::take(&mut chunk.inputs) {
            let result = catch_unwind(AssertUnwindSafe(|| transformer.transform(item)))
                .unwrap_or_else(|panic| Err(TransformError::Panicked(panic_message(panic.as_ref()))));
            match result {
                Ok(Transformed::Keep(out)) => chunk.outputs.push(out),
                Ok(Transformed::Filter) => chunk.filtered += 1,
                Err(e) => {
                    let err = BatchError::from(e);
                    self.skip_policy.check(&err, execution.skip_count() + chunk.skips())?;
                    warn!("chunk:skip-transform step={} err={}", execution.step_name, err);
                    chunk.process_skips += 1;
                }
            }
        }
        Ok(())
    }

    /// Escribe y confirma el chunk, reintentando fallos del sink según la
    /// `RetryPolicy`. Devuelve la `StepExecution` ya persistida.
    fn write(&mut self,
             chunk: &Chunk<I, O>,
             execution: &mut StepExecution,
             repo: &dyn JobRepository<Conn = C>)
             -> Result<StepExecution, BatchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut staged = execution.clone();
            staged.read_count += chunk.read;
            staged.read_skip_count += chunk.read_skips;
            staged.process_skip_count += chunk.process_skips;
            staged.filter_count += chunk.filtered;
            staged.write_count += chunk.outputs.len() as u64;
            staged.commit_count += 1;
            self.source.update(&mut staged.execution_context);

            let outputs = &chunk.outputs;
            let sink = &mut *self.sink;
            let result = repo.commit_chunk(&mut |conn| {
                                 if !outputs.is_empty() {
                                     sink.write(outputs, conn)?;
                                 }
                                 Ok(staged.clone())
                             });
            let error = match result {
                Ok(committed) => return Ok(committed),
                Err(e) => e,
            };

            execution.rollback_count += 1;
            warn!("chunk:rollback step={} attempt={} err={}", execution.step_name, attempt, error);
            repo.update_step_execution(execution)?;
            let current: &StepExecution = execution;
            listener::notify_all(self.listeners, "on_chunk_error", self.strict_listeners, |l| {
                l.on_chunk_error(current, &error)
            })?;

            let BatchError::Sink(cause) = error else {
                return Err(error);
            };
            if !self.retry_policy.should_retry(attempt) {
                if attempt == 1 {
                    return Err(BatchError::Sink(cause));
                }
                return Err(BatchError::RetryExhausted { attempts: attempt, cause });
            }
            let wait = self.retry_policy.backoff_for(attempt);
            if !wait.is_zero() {
                thread::sleep(wait);
            }
        }
    }
}
