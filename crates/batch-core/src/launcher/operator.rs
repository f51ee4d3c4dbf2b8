use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::info;
use uuid::Uuid;

use crate::errors::BatchError;
use crate::model::JobExecution;
use crate::repo::JobRepository;

/// Operaciones de control sobre ejecuciones existentes.
pub struct JobOperator<R: JobRepository> {
    repository: Arc<R>,
}

impl<R: JobRepository> JobOperator<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn get(&self, execution_id: Uuid) -> Result<Option<JobExecution>, BatchError> {
        self.repository.get_job_execution(execution_id)
    }

    /// Solicita un stop ordenado. El job lo atiende tras el commit del chunk
    /// en curso o entre steps.
    pub fn stop(&self, execution_id: Uuid) -> Result<bool, BatchError> {
        let requested = self.repository.request_stop(execution_id)?;
        info!("operator:stop execution={execution_id} requested={requested}");
        Ok(requested)
    }

    /// Marca una ejecución FAILED/STOPPED como ABANDONED para que su instancia
    /// no se reinicie.
    pub fn abandon(&self, execution_id: Uuid) -> Result<JobExecution, BatchError> {
        let mut execution = self.repository
                                .get_job_execution(execution_id)?
                                .ok_or_else(|| BatchError::Repository(format!("job execution {execution_id} not found")))?;
        execution.abandon()?;
        self.repository.update_job_execution(&mut execution)?;
        info!("operator:abandon execution={execution_id}");
        Ok(execution)
    }

    /// Sondea el repositorio hasta que la ejecución termina o vence `timeout`.
    pub fn wait_for_completion(&self,
                               execution_id: Uuid,
                               poll: Duration,
                               timeout: Duration)
                               -> Result<JobExecution, BatchError> {
        let deadline = Instant::now() + timeout;
        loop {
            let current = self.get(execution_id)?
                              .ok_or_else(|| BatchError::Repository(format!("job execution {execution_id} not found")))?;
            if current.end_time.is_some() {
                return Ok(current);
            }
            if Instant::now() >= deadline {
                return Err(BatchError::Repository(format!("timed out waiting for job execution {execution_id} (status {})",
                                                           current.status)));
            }
            thread::sleep(poll);
        }
    }
}
