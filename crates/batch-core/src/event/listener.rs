use std::sync::Arc;

use super::{BatchEventKind, EventStore};
use crate::errors::BatchError;
use crate::listener::{ExecutionListener, ListenerError};
use crate::model::{ExitStatus, JobExecution, StepExecution};

/// Listener que vuelca cada hook del ciclo de vida a un `EventStore`.
pub struct EventLogListener<E: EventStore> {
    store: Arc<E>,
}

impl<E: EventStore> EventLogListener<E> {
    pub fn new(store: Arc<E>) -> Self {
        Self { store }
    }

    fn append(&self, id: uuid::Uuid, kind: BatchEventKind) -> Result<(), ListenerError> {
        self.store
            .append_kind(id, kind)
            .map(|_| ())
            .map_err(|e| ListenerError::new(format!("event log: {e}")))
    }
}

impl<E: EventStore> ExecutionListener for EventLogListener<E> {
    fn before_job(&self, execution: &JobExecution) -> Result<(), ListenerError> {
        self.append(execution.id,
                    BatchEventKind::JobStarted { job_name: execution.job_name().to_string(),
                                                 parameters: execution.parameters.clone() })
    }

    fn after_job(&self, execution: &JobExecution) -> Result<(), ListenerError> {
        self.append(execution.id,
                    BatchEventKind::JobFinished { status: execution.status,
                                                  exit_code: execution.exit_status.exit_code.clone(),
                                                  summary: execution.summary() })
    }

    fn before_step(&self, execution: &StepExecution) -> Result<(), ListenerError> {
        self.append(execution.job_execution_id,
                    BatchEventKind::StepStarted { step_name: execution.step_name.clone() })
    }

    fn after_step(&self, execution: &StepExecution) -> Result<Option<ExitStatus>, ListenerError> {
        self.append(execution.job_execution_id,
                    BatchEventKind::StepFinished { step_name: execution.step_name.clone(),
                                                   status: execution.status,
                                                   exit_code: execution.exit_status.exit_code.clone(),
                                                   read_count: execution.read_count,
                                                   write_count: execution.write_count,
                                                   filter_count: execution.filter_count,
                                                   skip_count: execution.skip_count() })?;
        Ok(None)
    }

    fn after_chunk(&self, execution: &StepExecution) -> Result<(), ListenerError> {
        self.append(execution.job_execution_id,
                    BatchEventKind::ChunkCommitted { step_name: execution.step_name.clone(),
                                                     commit_count: execution.commit_count,
                                                     write_count: execution.write_count })
    }

    fn on_chunk_error(&self, execution: &StepExecution, error: &BatchError) -> Result<(), ListenerError> {
        self.append(execution.job_execution_id,
                    BatchEventKind::ChunkFailed { step_name: execution.step_name.clone(),
                                                  error: error.clone() })
    }
}
