//! Filas Diesel y mapeo fila <-> dominio. Parámetros, contextos y fallos se
//! guardan como JSONB; los estados como su nombre canónico en mayúsculas.

use batch_core::{BatchError, BatchStatus, ExecutionContext, ExitStatus, JobExecution, JobInstance, JobParameters,
                 StepExecution};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::schema::{batch_event_log, batch_job_execution, batch_job_instance, batch_step_execution};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = batch_job_instance)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct JobInstanceRow {
    pub id: Uuid,
    pub job_name: String,
    pub job_key: String,
}

impl JobInstanceRow {
    pub fn from_domain(instance: &JobInstance) -> Self {
        Self { id: instance.id,
               job_name: instance.job_name.clone(),
               job_key: instance.job_key.clone() }
    }

    pub fn into_domain(self) -> JobInstance {
        JobInstance { id: self.id,
                      job_name: self.job_name,
                      job_key: self.job_key }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = batch_job_execution)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub(crate) struct JobExecutionRow {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub version: i32,
    pub status: String,
    pub exit_code: String,
    pub exit_description: String,
    pub parameters: Value,
    pub execution_context: Value,
    pub failures: Value,
    pub engine_version: String,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl JobExecutionRow {
    pub fn from_domain(e: &JobExecution) -> Result<Self, PersistenceError> {
        Ok(Self { id: e.id,
                  instance_id: e.instance.id,
                  version: e.version,
                  status: e.status.as_str().to_string(),
                  exit_code: e.exit_status.exit_code.clone(),
                  exit_description: e.exit_status.exit_description.clone(),
                  parameters: serde_json::to_value(&e.parameters)?,
                  execution_context: e.execution_context.to_value(),
                  failures: serde_json::to_value(&e.failures)?,
                  engine_version: e.engine_version.clone(),
                  created_at: e.created_at,
                  start_time: e.start_time,
                  end_time: e.end_time,
                  last_updated: e.last_updated })
    }

    pub fn into_domain(self,
                       instance: JobInstance,
                       step_executions: Vec<StepExecution>)
                       -> Result<JobExecution, PersistenceError> {
        let parameters: JobParameters = serde_json::from_value(self.parameters)?;
        let failures: Vec<BatchError> = serde_json::from_value(self.failures)?;
        Ok(JobExecution { id: self.id,
                          instance,
                          parameters,
                          status: parse_status(&self.status)?,
                          exit_status: ExitStatus::new(self.exit_code).with_description(self.exit_description),
                          version: self.version,
                          created_at: self.created_at,
                          start_time: self.start_time,
                          end_time: self.end_time,
                          last_updated: self.last_updated,
                          step_executions,
                          execution_context: ExecutionContext::from_value(self.execution_context)?,
                          failures,
                          engine_version: self.engine_version })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = batch_step_execution)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub(crate) struct StepExecutionRow {
    pub id: Uuid,
    pub job_execution_id: Uuid,
    pub step_name: String,
    pub version: i32,
    pub status: String,
    pub exit_code: String,
    pub exit_description: String,
    pub read_count: i64,
    pub write_count: i64,
    pub filter_count: i64,
    pub read_skip_count: i64,
    pub process_skip_count: i64,
    pub commit_count: i64,
    pub rollback_count: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub execution_context: Value,
    pub failures: Value,
}

impl StepExecutionRow {
    pub fn from_domain(s: &StepExecution) -> Result<Self, PersistenceError> {
        Ok(Self { id: s.id,
                  job_execution_id: s.job_execution_id,
                  step_name: s.step_name.clone(),
                  version: s.version,
                  status: s.status.as_str().to_string(),
                  exit_code: s.exit_status.exit_code.clone(),
                  exit_description: s.exit_status.exit_description.clone(),
                  read_count: to_db(s.read_count)?,
                  write_count: to_db(s.write_count)?,
                  filter_count: to_db(s.filter_count)?,
                  read_skip_count: to_db(s.read_skip_count)?,
                  process_skip_count: to_db(s.process_skip_count)?,
                  commit_count: to_db(s.commit_count)?,
                  rollback_count: to_db(s.rollback_count)?,
                  start_time: s.start_time,
                  end_time: s.end_time,
                  last_updated: s.last_updated,
                  execution_context: s.execution_context.to_value(),
                  failures: serde_json::to_value(&s.failures)? })
    }

    pub fn into_domain(self) -> Result<StepExecution, PersistenceError> {
        let failures: Vec<BatchError> = serde_json::from_value(self.failures)?;
        Ok(StepExecution { id: self.id,
                           job_execution_id: self.job_execution_id,
                           step_name: self.step_name,
                           status: parse_status(&self.status)?,
                           exit_status: ExitStatus::new(self.exit_code).with_description(self.exit_description),
                           version: self.version,
                           read_count: from_db(self.read_count)?,
                           write_count: from_db(self.write_count)?,
                           filter_count: from_db(self.filter_count)?,
                           read_skip_count: from_db(self.read_skip_count)?,
                           process_skip_count: from_db(self.process_skip_count)?,
                           commit_count: from_db(self.commit_count)?,
                           rollback_count: from_db(self.rollback_count)?,
                           start_time: self.start_time,
                           end_time: self.end_time,
                           last_updated: self.last_updated,
                           execution_context: ExecutionContext::from_value(self.execution_context)?,
                           failures })
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = batch_event_log)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct EventRow {
    pub seq: i64,
    pub job_execution_id: Uuid,
    pub ts: DateTime<Utc>,
    pub event_type: String,
    pub payload: Value,
}

#[derive(Insertable)]
#[diesel(table_name = batch_event_log)]
pub(crate) struct NewEventRow<'a> {
    pub job_execution_id: &'a Uuid,
    pub event_type: &'a str,
    pub payload: &'a Value,
}

pub(crate) fn parse_status(raw: &str) -> Result<BatchStatus, PersistenceError> {
    raw.parse::<BatchStatus>().map_err(PersistenceError::Corrupt)
}

fn to_db(count: u64) -> Result<i64, PersistenceError> {
    i64::try_from(count).map_err(|_| PersistenceError::Corrupt(format!("count {count} out of range")))
}

fn from_db(count: i64) -> Result<u64, PersistenceError> {
    u64::try_from(count).map_err(|_| PersistenceError::Corrupt(format!("negative count {count}")))
}
