//! Persistencia de metadatos de ejecución.
//!
//! `JobRepository` registra instancias, ejecuciones de job y ejecuciones de
//! step, y es quien abre la transacción de cada chunk. El tipo asociado
//! `Conn` es el recurso transaccional compartido con los sinks: en memoria es
//! una `MemoryTransaction` que difiere efectos, en Postgres es la propia
//! conexión dentro de `transaction`. Así la escritura del chunk y la
//! actualización de contadores/contexto se confirman o revierten juntas.

pub mod memory;

use uuid::Uuid;

use crate::errors::BatchError;
use crate::model::{BatchStatus, ExecutionContext, JobExecution, JobParameters, StepExecution};

pub use memory::{InMemoryJobRepository, MemoryTransaction};

pub trait JobRepository: Send + Sync {
    type Conn;

    /// Crea (o reutiliza) la instancia y registra una ejecución STARTING.
    ///
    /// Falla con `JobExecutionAlreadyRunning` si la instancia tiene una
    /// ejecución en curso, `JobInstanceAlreadyComplete` si ya terminó bien y
    /// `Restart` si el job no es reiniciable o la última ejecución quedó
    /// ABANDONED/UNKNOWN. La comprobación y el alta son atómicas.
    fn create_job_execution(&self,
                            job_name: &str,
                            parameters: &JobParameters,
                            restartable: bool)
                            -> Result<JobExecution, BatchError>;

    /// Persiste estado, contexto y fallos. Verifica `version`, la incrementa y
    /// fusiona el estado con el almacenado (`merge_job_status`) para no perder
    /// una petición de stop concurrente.
    fn update_job_execution(&self, execution: &mut JobExecution) -> Result<(), BatchError>;

    fn create_step_execution(&self,
                             job_execution: &JobExecution,
                             step_name: &str,
                             context: ExecutionContext)
                             -> Result<StepExecution, BatchError>;

    fn update_step_execution(&self, execution: &mut StepExecution) -> Result<(), BatchError>;

    /// Ejecuta `work` dentro de una transacción y persiste la `StepExecution`
    /// que devuelve. Si `work` falla o la versión no coincide no queda ningún
    /// efecto visible.
    fn commit_chunk(&self,
                    work: &mut dyn FnMut(&mut Self::Conn) -> Result<StepExecution, BatchError>)
                    -> Result<StepExecution, BatchError>;

    /// Ejecución de job con sus step executions adjuntas.
    fn get_job_execution(&self, id: Uuid) -> Result<Option<JobExecution>, BatchError>;

    fn find_last_job_execution(&self,
                               job_name: &str,
                               parameters: &JobParameters)
                               -> Result<Option<JobExecution>, BatchError>;

    /// Última ejecución de cualquier instancia del job (para incrementers).
    fn find_latest_job_execution(&self, job_name: &str) -> Result<Option<JobExecution>, BatchError>;

    fn find_last_step_execution(&self,
                                instance_id: Uuid,
                                step_name: &str)
                                -> Result<Option<StepExecution>, BatchError>;

    fn count_step_executions(&self, instance_id: Uuid, step_name: &str) -> Result<u32, BatchError>;

    /// Marca la ejecución como STOPPING. Devuelve `false` si ya no estaba en
    /// curso. No incrementa la versión: la fusión de estados en
    /// `update_job_execution` conserva la petición.
    fn request_stop(&self, job_execution_id: Uuid) -> Result<bool, BatchError>;

    fn is_stop_requested(&self, job_execution_id: Uuid) -> Result<bool, BatchError>;
}

/// Reglas de relanzamiento sobre las ejecuciones previas de una instancia.
pub fn check_relaunch(job_name: &str,
                      job_key: &str,
                      previous: &[JobExecution],
                      restartable: bool)
                      -> Result<(), BatchError> {
    if previous.is_empty() {
        return Ok(());
    }
    for execution in previous {
        if execution.status.is_running() {
            return Err(BatchError::JobExecutionAlreadyRunning { job_name: job_name.to_string(),
                                                                execution_id: execution.id });
        }
        match execution.status {
            BatchStatus::Completed => {
                return Err(BatchError::JobInstanceAlreadyComplete { job_name: job_name.to_string(),
                                                                    job_key: job_key.to_string() })
            }
            BatchStatus::Abandoned | BatchStatus::Unknown => {
                return Err(BatchError::Restart(format!("execution {} of {job_name} is {}",
                                                       execution.id, execution.status)))
            }
            _ => {}
        }
    }
    if !restartable {
        return Err(BatchError::Restart(format!("job {job_name} is not restartable")));
    }
    Ok(())
}

/// Fusiona el estado persistido con el que propone el motor. Un STOPPING
/// pendiente convierte un COMPLETED en STOPPED.
pub fn merge_job_status(stored: BatchStatus, incoming: BatchStatus) -> BatchStatus {
    match (stored, incoming) {
        (BatchStatus::Stopping, BatchStatus::Completed) => BatchStatus::Stopped,
        (BatchStatus::Failed | BatchStatus::Stopped, BatchStatus::Abandoned) => BatchStatus::Abandoned,
        _ => stored.upgrade_to(incoming),
    }
}

pub(crate) fn stale(entity: &str, id: Uuid, expected: i32, found: i32) -> BatchError {
    BatchError::OptimisticLock { entity: entity.to_string(),
                                 id,
                                 expected,
                                 found }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExitStatus, JobInstance};

    fn finished(status: BatchStatus) -> JobExecution {
        let params = JobParameters::new();
        let mut e = JobExecution::new(JobInstance::new("j", &params), params);
        e.mark_started().expect("start");
        e.finish(status, ExitStatus::from(status)).expect("finish");
        e
    }

    #[test]
    fn relaunch_rules() {
        assert!(check_relaunch("j", "k", &[], false).is_ok());
        assert!(check_relaunch("j", "k", &[finished(BatchStatus::Failed)], true).is_ok());
        assert!(matches!(check_relaunch("j", "k", &[finished(BatchStatus::Failed)], false),
                         Err(BatchError::Restart(_))));
        assert!(matches!(check_relaunch("j", "k", &[finished(BatchStatus::Completed)], true),
                         Err(BatchError::JobInstanceAlreadyComplete { .. })));
        let params = JobParameters::new();
        let running = JobExecution::new(JobInstance::new("j", &params), params);
        assert!(matches!(check_relaunch("j", "k", &[running], true),
                         Err(BatchError::JobExecutionAlreadyRunning { .. })));
    }

    #[test]
    fn stop_request_survives_merge() {
        assert_eq!(merge_job_status(BatchStatus::Stopping, BatchStatus::Started), BatchStatus::Stopping);
        assert_eq!(merge_job_status(BatchStatus::Stopping, BatchStatus::Completed), BatchStatus::Stopped);
        assert_eq!(merge_job_status(BatchStatus::Started, BatchStatus::Completed), BatchStatus::Completed);
        assert_eq!(merge_job_status(BatchStatus::Failed, BatchStatus::Abandoned), BatchStatus::Abandoned);
    }
}
