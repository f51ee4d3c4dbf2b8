//! Códigos de salida de proceso para lanzadores de línea de comandos.

use crate::errors::BatchError;
use crate::model::{BatchStatus, JobExecution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Completed = 0,
    Failed = 1,
    AlreadyComplete = 2,
    Configuration = 3,
    AlreadyRunning = 4,
    Stopped = 5,
    RestartRefused = 6,
    /// La ejecución aún no terminó (lanzamiento asíncrono sin esperar).
    Running = 7,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

pub fn exit_code_for(result: &Result<JobExecution, BatchError>) -> ExitCode {
    match result {
        Ok(execution) => match execution.status {
            BatchStatus::Completed => ExitCode::Completed,
            BatchStatus::Stopped => ExitCode::Stopped,
            BatchStatus::Starting | BatchStatus::Started | BatchStatus::Stopping => ExitCode::Running,
            _ => ExitCode::Failed,
        },
        Err(BatchError::JobInstanceAlreadyComplete { .. }) => ExitCode::AlreadyComplete,
        Err(BatchError::JobExecutionAlreadyRunning { .. }) => ExitCode::AlreadyRunning,
        Err(BatchError::Restart(_)) => ExitCode::RestartRefused,
        Err(BatchError::Configuration(_)) => ExitCode::Configuration,
        Err(_) => ExitCode::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExitStatus, JobInstance, JobParameters};

    #[test]
    fn launch_errors_map_to_distinct_codes() {
        let complete = Err(BatchError::JobInstanceAlreadyComplete { job_name: "j".into(),
                                                                    job_key: "k".into() });
        assert_eq!(exit_code_for(&complete).code(), 2);
        assert_eq!(exit_code_for(&Err(BatchError::Restart("no".into()))).code(), 6);
        assert_eq!(exit_code_for(&Err(BatchError::Configuration("bad".into()))).code(), 3);
        assert_eq!(exit_code_for(&Err(BatchError::Repository("db".into()))).code(), 1);
    }

    #[test]
    fn unfinished_executions_are_not_reported_as_completed() {
        let params = JobParameters::new();
        let mut execution = JobExecution::new(JobInstance::new("j", &params), params);
        assert_eq!(exit_code_for(&Ok(execution.clone())), ExitCode::Running);
        execution.mark_started().expect("start");
        assert_eq!(exit_code_for(&Ok(execution.clone())).code(), 7);
        execution.finish(BatchStatus::Completed, ExitStatus::completed()).expect("finish");
        assert_eq!(exit_code_for(&Ok(execution)), ExitCode::Completed);
    }
}
