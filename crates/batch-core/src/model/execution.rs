//! Entidades de ejecución: `JobInstance`, `JobExecution`, `StepExecution`.
//!
//! Invariantes:
//! - El estado avanza sólo hacia adelante (`BatchStatus::can_transition_to`).
//! - Una ejecución con `end_time` fijado no admite más mutaciones de estado,
//!   contadores ni contexto (`BatchError::ExecutionClosed`). La única
//!   excepción es `abandon`, que sólo cambia el estado de una ejecución
//!   terminal fallida/detenida.
//! - Los contadores de `StepExecution` reflejan exactamente los chunks
//!   confirmados: el executor trabaja sobre una copia y sólo la adopta
//!   después del commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::BatchError;
use crate::model::{BatchStatus, ExecutionContext, ExitStatus, JobParameters};

/// Identidad de un job: (nombre, parámetros identificadores).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: Uuid,
    pub job_name: String,
    pub job_key: String,
}

impl JobInstance {
    pub fn new(job_name: impl Into<String>, parameters: &JobParameters) -> Self {
        Self { id: Uuid::new_v4(),
               job_name: job_name.into(),
               job_key: parameters.job_key() }
    }
}

/// Totales agregados de todos los steps de una ejecución.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub read_count: u64,
    pub write_count: u64,
    pub filter_count: u64,
    pub skip_count: u64,
    pub commit_count: u64,
    pub rollback_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub instance: JobInstance,
    pub parameters: JobParameters,
    pub status: BatchStatus,
    pub exit_status: ExitStatus,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub step_executions: Vec<StepExecution>,
    pub execution_context: ExecutionContext,
    pub failures: Vec<BatchError>,
    pub engine_version: String,
}

impl JobExecution {
    pub fn new(instance: JobInstance, parameters: JobParameters) -> Self {
        let now = Utc::now();
        Self { id: Uuid::new_v4(),
               instance,
               parameters,
               status: BatchStatus::Starting,
               exit_status: ExitStatus::unknown(),
               version: 0,
               created_at: now,
               start_time: None,
               end_time: None,
               last_updated: now,
               step_executions: Vec::new(),
               execution_context: ExecutionContext::new(),
               failures: Vec::new(),
               engine_version: crate::constants::ENGINE_VERSION.to_string() }
    }

    pub fn job_name(&self) -> &str {
        &self.instance.job_name
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn ensure_open(&self) -> Result<(), BatchError> {
        if self.end_time.is_some() {
            return Err(BatchError::ExecutionClosed);
        }
        Ok(())
    }

    /// Transición validada. Repetir el estado actual es un no-op.
    pub fn transition_to(&mut self, to: BatchStatus) -> Result<(), BatchError> {
        self.ensure_open()?;
        if self.status == to {
            return Ok(());
        }
        if !self.status.can_transition_to(to) {
            return Err(BatchError::InvalidTransition { from: self.status, to });
        }
        self.status = to;
        self.last_updated = Utc::now();
        Ok(())
    }

    pub fn mark_started(&mut self) -> Result<(), BatchError> {
        self.transition_to(BatchStatus::Started)?;
        self.start_time = Some(Utc::now());
        self.exit_status = ExitStatus::executing();
        Ok(())
    }

    /// Fija el estado terminal, el código de salida y `end_time`.
    pub fn finish(&mut self, status: BatchStatus, exit_status: ExitStatus) -> Result<(), BatchError> {
        self.transition_to(status)?;
        self.exit_status = exit_status;
        let now = Utc::now();
        self.end_time = Some(now);
        self.last_updated = now;
        Ok(())
    }

    pub fn add_failure(&mut self, error: BatchError) -> Result<(), BatchError> {
        self.ensure_open()?;
        self.failures.push(error);
        Ok(())
    }

    pub fn abandon(&mut self) -> Result<(), BatchError> {
        if !self.status.can_transition_to(BatchStatus::Abandoned) {
            return Err(BatchError::InvalidTransition { from: self.status,
                                                       to: BatchStatus::Abandoned });
        }
        self.status = BatchStatus::Abandoned;
        self.exit_status = ExitStatus::failed().with_description("abandoned");
        self.last_updated = Utc::now();
        Ok(())
    }

    pub fn summary(&self) -> ExecutionSummary {
        self.step_executions.iter().fold(ExecutionSummary::default(), |mut acc, s| {
                                       acc.read_count += s.read_count;
                                       acc.write_count += s.write_count;
                                       acc.filter_count += s.filter_count;
                                       acc.skip_count += s.skip_count();
                                       acc.commit_count += s.commit_count;
                                       acc.rollback_count += s.rollback_count;
                                       acc
                                   })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: Uuid,
    pub job_execution_id: Uuid,
    pub step_name: String,
    pub status: BatchStatus,
    pub exit_status: ExitStatus,
    pub version: i32,
    pub read_count: u64,
    pub write_count: u64,
    pub filter_count: u64,
    pub read_skip_count: u64,
    pub process_skip_count: u64,
    pub commit_count: u64,
    pub rollback_count: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub execution_context: ExecutionContext,
    pub failures: Vec<BatchError>,
}

impl StepExecution {
    pub fn new(job_execution_id: Uuid, step_name: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(),
               job_execution_id,
               step_name: step_name.into(),
               status: BatchStatus::Starting,
               exit_status: ExitStatus::executing(),
               version: 0,
               read_count: 0,
               write_count: 0,
               filter_count: 0,
               read_skip_count: 0,
               process_skip_count: 0,
               commit_count: 0,
               rollback_count: 0,
               start_time: None,
               end_time: None,
               last_updated: Utc::now(),
               execution_context: ExecutionContext::new(),
               failures: Vec::new() }
    }

    pub fn skip_count(&self) -> u64 {
        self.read_skip_count + self.process_skip_count
    }

    pub fn ensure_open(&self) -> Result<(), BatchError> {
        if self.end_time.is_some() {
            return Err(BatchError::ExecutionClosed);
        }
        Ok(())
    }

    pub fn transition_to(&mut self, to: BatchStatus) -> Result<(), BatchError> {
        self.ensure_open()?;
        if self.status == to {
            return Ok(());
        }
        if !self.status.can_transition_to(to) {
            return Err(BatchError::InvalidTransition { from: self.status, to });
        }
        self.status = to;
        self.last_updated = Utc::now();
        Ok(())
    }

    pub fn mark_started(&mut self) -> Result<(), BatchError> {
        self.transition_to(BatchStatus::Started)?;
        self.start_time = Some(Utc::now());
        Ok(())
    }

    pub fn finish(&mut self, status: BatchStatus, exit_status: ExitStatus) -> Result<(), BatchError> {
        self.transition_to(status)?;
        self.exit_status = exit_status;
        let now = Utc::now();
        self.end_time = Some(now);
        self.last_updated = now;
        Ok(())
    }

    pub fn add_failure(&mut self, error: BatchError) -> Result<(), BatchError> {
        self.ensure_open()?;
        self.failures.push(error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution() -> JobExecution {
        let params = JobParameters::new().with_long("run.id", 1);
        JobExecution::new(JobInstance::new("job", &params), params)
    }

    #[test]
    fn closed_execution_rejects_mutation() {
        let mut exec = execution();
        exec.mark_started().expect("start");
        exec.finish(BatchStatus::Completed, ExitStatus::completed()).expect("finish");
        assert_eq!(exec.transition_to(BatchStatus::Failed), Err(BatchError::ExecutionClosed));
        assert_eq!(exec.add_failure(BatchError::Tasklet("x".into())), Err(BatchError::ExecutionClosed));
    }

    #[test]
    fn invalid_transition_is_reported() {
        let mut step = StepExecution::new(Uuid::new_v4(), "s");
        assert_eq!(step.transition_to(BatchStatus::Completed),
                   Err(BatchError::InvalidTransition { from: BatchStatus::Starting,
                                                       to: BatchStatus::Completed }));
    }

    #[test]
    fn only_failed_or_stopped_can_be_abandoned() {
        let mut exec = execution();
        exec.mark_started().expect("start");
        assert!(exec.abandon().is_err());
        exec.finish(BatchStatus::Failed, ExitStatus::failed()).expect("finish");
        exec.abandon().expect("abandon");
        assert_eq!(exec.status, BatchStatus::Abandoned);
    }

    #[test]
    fn summary_adds_step_counts() {
        let mut exec = execution();
        let mut a = StepExecution::new(exec.id, "a");
        a.read_count = 5;
        a.write_count = 3;
        a.filter_count = 1;
        a.process_skip_count = 1;
        a.commit_count = 1;
        let mut b = StepExecution::new(exec.id, "b");
        b.read_count = 2;
        b.write_count = 2;
        b.read_skip_count = 1;
        b.commit_count = 1;
        exec.step_executions = vec![a, b];
        let s = exec.summary();
        assert_eq!((s.read_count, s.write_count, s.filter_count, s.skip_count, s.commit_count), (7, 5, 1, 2, 2));
    }
}
