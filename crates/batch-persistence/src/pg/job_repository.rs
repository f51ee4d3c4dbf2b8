use batch_core::repo::{check_relaunch, merge_job_status};
use batch_core::{BatchError, BatchStatus, ExecutionContext, JobExecution, JobParameters, JobRepository, StepExecution};
use chrono::Utc;
use diesel::prelude::*;
use log::{debug, info};
use uuid::Uuid;

use super::rows::{parse_status, JobExecutionRow, JobInstanceRow, StepExecutionRow};
use super::{with_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::{batch_job_execution as bje, batch_job_instance as bji, batch_step_execution as bse};

/// Error interno de una unidad transaccional: distingue los rechazos del
/// dominio (no reintentables, provocan rollback) de los fallos de base de
/// datos.
enum TxError {
    Batch(BatchError),
    Db(PersistenceError),
}

impl From<diesel::result::Error> for TxError {
    fn from(e: diesel::result::Error) -> Self {
        TxError::Db(e.into())
    }
}

impl From<PersistenceError> for TxError {
    fn from(e: PersistenceError) -> Self {
        TxError::Db(e)
    }
}

impl From<BatchError> for TxError {
    fn from(e: BatchError) -> Self {
        TxError::Batch(e)
    }
}

impl From<TxError> for BatchError {
    fn from(e: TxError) -> Self {
        match e {
            TxError::Batch(b) => b,
            TxError::Db(p) => p.into(),
        }
    }
}

/// Reintenta sólo los fallos transitorios de base de datos.
fn retry_tx<T>(mut f: impl FnMut() -> Result<T, TxError>) -> Result<T, BatchError> {
    let outcome = with_retry(|| match f() {
        Ok(v) => Ok(Ok(v)),
        Err(TxError::Batch(b)) => Ok(Err(b)),
        Err(TxError::Db(e)) => Err(e),
    })?;
    outcome
}

fn not_found(entity: &str, id: Uuid) -> BatchError {
    BatchError::Repository(format!("{entity} {id} not found"))
}

fn stale(entity: &str, id: Uuid, expected: i32, found: i32) -> BatchError {
    BatchError::OptimisticLock { entity: entity.to_string(),
                                 id,
                                 expected,
                                 found }
}

fn load_steps(conn: &mut PgConnection, job_execution_id: Uuid) -> Result<Vec<StepExecution>, TxError> {
    let rows: Vec<StepExecutionRow> = bse::table.filter(bse::job_execution_id.eq(job_execution_id))
                                                .order(bse::seq.asc())
                                                .select(StepExecutionRow::as_select())
                                                .load(conn)?;
    rows.into_iter().map(|r| r.into_domain().map_err(TxError::from)).collect()
}

fn assemble(conn: &mut PgConnection,
            row: JobExecutionRow,
            instance: JobInstanceRow)
            -> Result<JobExecution, TxError> {
    let steps = load_steps(conn, row.id)?;
    Ok(row.into_domain(instance.into_domain(), steps)?)
}

/// Versión actual de una step execution (para diagnosticar un update sin
/// filas afectadas).
fn step_conflict(conn: &mut PgConnection, id: Uuid, expected: i32) -> Result<BatchError, TxError> {
    let found: Option<i32> = bse::table.find(id).select(bse::version).get_result(conn).optional()?;
    Ok(match found {
        Some(v) => stale("step execution", id, expected, v),
        None => not_found("step execution", id),
    })
}

/// Repositorio de metadatos sobre Postgres.
pub struct PgJobRepository<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgJobRepository<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Todas las ejecuciones de un job, más recientes primero (sin steps).
    pub fn list_job_executions(&self, job_name: &str) -> Result<Vec<JobExecution>, BatchError> {
        retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let rows: Vec<(JobExecutionRow, JobInstanceRow)> =
                bje::table.inner_join(bji::table)
                          .filter(bji::job_name.eq(job_name))
                          .order(bje::seq.desc())
                          .select((JobExecutionRow::as_select(), JobInstanceRow::as_select()))
                          .load(&mut conn)?;
            rows.into_iter()
                .map(|(e, i)| e.into_domain(i.into_domain(), Vec::new()).map_err(TxError::from))
                .collect()
        })
    }
}

impl<P: ConnectionProvider> JobRepository for PgJobRepository<P> {
    type Conn = PgConnection;

    fn create_job_execution(&self,
                            job_name: &str,
                            parameters: &JobParameters,
                            restartable: bool)
                            -> Result<JobExecution, BatchError> {
        let job_key = parameters.job_key();
        let execution = retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let conn: &mut PgConnection = &mut conn;
            conn.transaction::<_, TxError, _>(|tx| {
                    let candidate = JobInstanceRow { id: Uuid::new_v4(),
                                                     job_name: job_name.to_string(),
                                                     job_key: job_key.clone() };
                    diesel::insert_into(bji::table).values(&candidate)
                                                   .on_conflict((bji::job_name, bji::job_key))
                                                   .do_nothing()
                                                   .execute(tx)?;
                    // Bloquea la instancia hasta el commit: los lanzamientos
                    // concurrentes se serializan aquí.
                    let instance: JobInstanceRow = bji::table.filter(bji::job_name.eq(job_name))
                                                             .filter(bji::job_key.eq(&job_key))
                                                             .select(JobInstanceRow::as_select())
                                                             .for_update()
                                                             .get_result(tx)?;
                    let previous_rows: Vec<JobExecutionRow> = bje::table.filter(bje::instance_id.eq(instance.id))
                                                                        .order(bje::seq.asc())
                                                                        .select(JobExecutionRow::as_select())
                                                                        .load(tx)?;
                    let instance = instance.into_domain();
                    let previous = previous_rows.into_iter()
                                                .map(|r| r.into_domain(instance.clone(), Vec::new()))
                                                .collect::<Result<Vec<_>, _>>()?;
                    check_relaunch(job_name, &job_key, &previous, restartable)?;
                    let mut execution = JobExecution::new(instance, parameters.clone());
                    if let Some(last) = previous.last() {
                        execution.execution_context = last.execution_context.clone();
                    }
                    diesel::insert_into(bje::table).values(&JobExecutionRow::from_domain(&execution)?)
                                                   .execute(tx)?;
                    Ok(execution)
                })
        })?;
        info!("repo:create-job-execution job={} execution={} instance={}",
              job_name, execution.id, execution.instance.id);
        Ok(execution)
    }

    fn update_job_execution(&self, execution: &mut JobExecution) -> Result<(), BatchError> {
        let snapshot = execution.clone();
        let next = retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let conn: &mut PgConnection = &mut conn;
            conn.transaction::<_, TxError, _>(|tx| {
                    let stored: Option<(i32, String)> = bje::table.find(snapshot.id)
                                                                  .select((bje::version, bje::status))
                                                                  .for_update()
                                                                  .get_result(tx)
                                                                  .optional()?;
                    let (found_version, found_status) =
                        stored.ok_or_else(|| not_found("job execution", snapshot.id))?;
                    if found_version != snapshot.version {
                        return Err(stale("job execution", snapshot.id, snapshot.version, found_version).into());
                    }
                    let mut next = snapshot.clone();
                    next.status = merge_job_status(parse_status(&found_status)?, snapshot.status);
                    next.version += 1;
                    next.last_updated = Utc::now();
                    diesel::update(bje::table.find(next.id)).set(&JobExecutionRow::from_domain(&next)?)
                                                            .execute(tx)?;
                    Ok(next)
                })
        })?;
        if next.status != execution.status {
            debug!("repo:merge-status execution={} ours={} merged={}",
                   execution.id, execution.status, next.status);
        }
        execution.status = next.status;
        execution.version = next.version;
        execution.last_updated = next.last_updated;
        Ok(())
    }

    fn create_step_execution(&self,
                             job_execution: &JobExecution,
                             step_name: &str,
                             context: ExecutionContext)
                             -> Result<StepExecution, BatchError> {
        let mut step = StepExecution::new(job_execution.id, step_name);
        step.execution_context = context;
        let row = StepExecutionRow::from_domain(&step)?;
        retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let exists: i64 = bje::table.filter(bje::id.eq(job_execution.id)).count().get_result(&mut conn)?;
            if exists == 0 {
                return Err(not_found("job execution", job_execution.id).into());
            }
            diesel::insert_into(bse::table).values(&row).execute(&mut conn)?;
            Ok(())
        })?;
        debug!("repo:create-step-execution step={} id={} job_execution={}",
               step_name, step.id, job_execution.id);
        Ok(step)
    }

    fn update_step_execution(&self, execution: &mut StepExecution) -> Result<(), BatchError> {
        let mut next = execution.clone();
        next.version += 1;
        next.last_updated = Utc::now();
        let row = StepExecutionRow::from_domain(&next)?;
        let expected = execution.version;
        retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let updated = diesel::update(bse::table.filter(bse::id.eq(row.id)).filter(bse::version.eq(expected)))
                .set(&row)
                .execute(&mut conn)?;
            if updated == 0 {
                return Err(step_conflict(&mut conn, row.id, expected)?.into());
            }
            Ok(())
        })?;
        execution.version = next.version;
        execution.last_updated = next.last_updated;
        Ok(())
    }

    fn commit_chunk(&self,
                    work: &mut dyn FnMut(&mut Self::Conn) -> Result<StepExecution, BatchError>)
                    -> Result<StepExecution, BatchError> {
        let mut conn = self.provider.connection()?;
        let conn: &mut PgConnection = &mut conn;
        let committed = conn.transaction::<_, TxError, _>(|tx| {
                                let mut staged = work(tx)?;
                                let expected = staged.version;
                                staged.version += 1;
                                staged.last_updated = Utc::now();
                                let row = StepExecutionRow::from_domain(&staged)?;
                                let updated = diesel::update(bse::table.filter(bse::id.eq(staged.id))
                                                                       .filter(bse::version.eq(expected)))
                                    .set(&row)
                                    .execute(tx)?;
                                if updated == 0 {
                                    return Err(step_conflict(tx, staged.id, expected)?.into());
                                }
                                Ok(staged)
                            })?;
        Ok(committed)
    }

    fn get_job_execution(&self, id: Uuid) -> Result<Option<JobExecution>, BatchError> {
        retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let conn: &mut PgConnection = &mut conn;
            let found: Option<(JobExecutionRow, JobInstanceRow)> =
                bje::table.inner_join(bji::table)
                          .filter(bje::id.eq(id))
                          .select((JobExecutionRow::as_select(), JobInstanceRow::as_select()))
                          .first(conn)
                          .optional()?;
            found.map(|(e, i)| assemble(conn, e, i)).transpose()
        })
    }

    fn find_last_job_execution(&self,
                               job_name: &str,
                               parameters: &JobParameters)
                               -> Result<Option<JobExecution>, BatchError> {
        let job_key = parameters.job_key();
        retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let conn: &mut PgConnection = &mut conn;
            let found: Option<(JobExecutionRow, JobInstanceRow)> =
                bje::table.inner_join(bji::table)
                          .filter(bji::job_name.eq(job_name))
                          .filter(bji::job_key.eq(&job_key))
                          .order(bje::seq.desc())
                          .select((JobExecutionRow::as_select(), JobInstanceRow::as_select()))
                          .first(conn)
                          .optional()?;
            found.map(|(e, i)| assemble(conn, e, i)).transpose()
        })
    }

    fn find_latest_job_execution(&self, job_name: &str) -> Result<Option<JobExecution>, BatchError> {
        retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let conn: &mut PgConnection = &mut conn;
            let found: Option<(JobExecutionRow, JobInstanceRow)> =
                bje::table.inner_join(bji::table)
                          .filter(bji::job_name.eq(job_name))
                          .order(bje::seq.desc())
                          .select((JobExecutionRow::as_select(), JobInstanceRow::as_select()))
                          .first(conn)
                          .optional()?;
            found.map(|(e, i)| assemble(conn, e, i)).transpose()
        })
    }

    fn find_last_step_execution(&self,
                                instance_id: Uuid,
                                step_name: &str)
                                -> Result<Option<StepExecution>, BatchError> {
        retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let found: Option<StepExecutionRow> = bse::table.inner_join(bje::table)
                                                            .filter(bje::instance_id.eq(instance_id))
                                                            .filter(bse::step_name.eq(step_name))
                                                            .order(bse::seq.desc())
                                                            .select(StepExecutionRow::as_select())
                                                            .first(&mut conn)
                                                            .optional()?;
            Ok(found.map(StepExecutionRow::into_domain).transpose()?)
        })
    }

    fn count_step_executions(&self, instance_id: Uuid, step_name: &str) -> Result<u32, BatchError> {
        retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let count: i64 = bse::table.inner_join(bje::table)
                                       .filter(bje::instance_id.eq(instance_id))
                                       .filter(bse::step_name.eq(step_name))
                                       .count()
                                       .get_result(&mut conn)?;
            Ok(u32::try_from(count).unwrap_or(u32::MAX))
        })
    }

    fn request_stop(&self, job_execution_id: Uuid) -> Result<bool, BatchError> {
        let running = [BatchStatus::Starting.as_str(), BatchStatus::Started.as_str()];
        let accepted = retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let updated = diesel::update(bje::table.find(job_execution_id).filter(bje::status.eq_any(running)))
                .set((bje::status.eq(BatchStatus::Stopping.as_str()), bje::last_updated.eq(Utc::now())))
                .execute(&mut conn)?;
            if updated > 0 {
                return Ok(true);
            }
            let status: Option<String> = bje::table.find(job_execution_id)
                                                   .select(bje::status)
                                                   .get_result(&mut conn)
                                                   .optional()?;
            match status {
                Some(s) => Ok(s == BatchStatus::Stopping.as_str()),
                None => Err(not_found("job execution", job_execution_id).into()),
            }
        })?;
        if accepted {
            info!("repo:request-stop execution={job_execution_id}");
        }
        Ok(accepted)
    }

    fn is_stop_requested(&self, job_execution_id: Uuid) -> Result<bool, BatchError> {
        retry_tx(|| {
            let mut conn = self.provider.connection()?;
            let status: Option<String> = bje::table.find(job_execution_id)
                                                   .select(bje::status)
                                                   .get_result(&mut conn)
                                                   .optional()?;
            Ok(status.as_deref() == Some(BatchStatus::Stopping.as_str()))
        })
    }
}
