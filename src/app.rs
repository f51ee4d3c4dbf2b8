//! Ejecución de comandos.
//!
//! Sin `DATABASE_URL` todo corre en memoria dentro del proceso (útil para
//! pruebas y demos); `status`, `stop` y `abandon` requieren Postgres porque
//! operan sobre ejecuciones de otros procesos.

use std::sync::Arc;
use std::time::Duration;

use batch_adapters::{hello_job, import_user_job, ImportSettings, PeopleStore, PgPeopleDirectory, PgPeopleSink,
                     HELLO_JOB, IMPORT_USER_JOB};
use batch_core::{exit_code_for, BatchError, EventLogListener, EventStore, ExitCode, InMemoryEventStore,
                 InMemoryJobRepository, Job, JobExecution, JobLauncher, JobOperator, JobParameters, JobRepository,
                 LaunchMode, MemoryTransaction, SharedListener};
use batch_persistence::{build_pool, PgEventStore, PgJobRepository, PoolProvider};
use diesel::pg::PgConnection;
use log::{debug, error, info};
use uuid::Uuid;

use crate::cli::Command;
use crate::config::AppConfig;

pub const JOBS: [&str; 2] = [IMPORT_USER_JOB, HELLO_JOB];

const INPUT_PARAM: &str = "input.file";

/// Lanzamiento ya resuelto: configuración + flags.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub job: String,
    pub parameters: JobParameters,
    pub mode: LaunchMode,
    pub next: bool,
    pub settings: ImportSettings,
    pub wait_timeout: Duration,
}

impl LaunchRequest {
    pub fn resolve(job: String,
                   params: &[String],
                   config: &AppConfig,
                   overrides: LaunchOverrides)
                   -> Result<Self, BatchError> {
        let mut parameters = JobParameters::parse_pairs(params)?;
        let settings = ImportSettings { input: overrides.input.unwrap_or_else(|| config.input.clone()),
                                        chunk_size: overrides.chunk_size.unwrap_or(config.chunk_size),
                                        skip_limit: overrides.skip_limit.unwrap_or(config.skip_limit),
                                        retry_limit: config.retry_limit,
                                        ..ImportSettings::default() };
        if job == IMPORT_USER_JOB && !parameters.contains(INPUT_PARAM) {
            parameters = parameters.with_string(INPUT_PARAM, settings.input.display().to_string());
        }
        Ok(Self { job,
                  parameters,
                  mode: if overrides.async_mode { LaunchMode::Async } else { config.launch_mode },
                  next: overrides.next,
                  settings,
                  wait_timeout: config.wait_timeout })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub input: Option<std::path::PathBuf>,
    pub chunk_size: Option<usize>,
    pub skip_limit: Option<u32>,
    pub async_mode: bool,
    pub next: bool,
}

/// Ejecuta un comando y devuelve el código de salida del proceso.
pub fn run(command: Command, config: &AppConfig) -> ExitCode {
    match command {
        Command::Launch { job,
                          params,
                          input,
                          chunk_size,
                          skip_limit,
                          async_mode,
                          next, } => {
            let overrides = LaunchOverrides { input,
                                              chunk_size,
                                              skip_limit,
                                              async_mode,
                                              next };
            let result = LaunchRequest::resolve(job, &params, config, overrides).and_then(|r| launch(&r, config));
            report_launch(&result);
            exit_code_for(&result)
        }
        Command::Status { execution } => admin(config, |op| {
            op.get(execution)?
              .ok_or_else(|| BatchError::Repository(format!("job execution {execution} not found")))
        }),
        Command::Stop { execution } => admin(config, |op| {
            if !op.stop(execution)? {
                return Err(BatchError::Configuration(format!("job execution {execution} is not running")));
            }
            op.get(execution)?
              .ok_or_else(|| BatchError::Repository(format!("job execution {execution} not found")))
        }),
        Command::Abandon { execution } => admin(config, |op| op.abandon(execution)),
        Command::Jobs => {
            for job in JOBS {
                println!("{job}");
            }
            ExitCode::Completed
        }
    }
}

/// Lanza según el backend configurado.
pub fn launch(request: &LaunchRequest, config: &AppConfig) -> Result<JobExecution, BatchError> {
    match &config.database {
        None => launch_in_memory(request),
        Some(db) => {
            let pool = build_pool(&db.url, db.min_connections, db.max_connections)?;
            launch_in_postgres(request, Arc::new(PoolProvider::new(pool)))
        }
    }
}

fn unknown_job(name: &str) -> BatchError {
    BatchError::Configuration(format!("unknown job '{name}' (available: {})", JOBS.join(", ")))
}

pub fn launch_in_memory(request: &LaunchRequest) -> Result<JobExecution, BatchError> {
    let repository = Arc::new(InMemoryJobRepository::new());
    let events = Arc::new(InMemoryEventStore::new());
    let listeners: Vec<SharedListener> = vec![Arc::new(EventLogListener::new(Arc::clone(&events)))];
    let store = PeopleStore::new();
    let job: Job<MemoryTransaction> = match request.job.as_str() {
        IMPORT_USER_JOB => import_user_job(&request.settings, store.clone(), Arc::new(store.clone()), &listeners)?,
        HELLO_JOB => hello_job(&listeners)?,
        other => return Err(unknown_job(other)),
    };
    let execution = launch_on(repository, job, request)?;
    trace_events(events.as_ref(), execution.id);
    Ok(execution)
}

pub fn launch_in_postgres(request: &LaunchRequest, provider: Arc<PoolProvider>) -> Result<JobExecution, BatchError> {
    let repository = Arc::new(PgJobRepository::new(provider.as_ref().clone()));
    let events = Arc::new(PgEventStore::new(provider.as_ref().clone()));
    let listeners: Vec<SharedListener> = vec![Arc::new(EventLogListener::new(Arc::clone(&events)))];
    let job: Job<PgConnection> = match request.job.as_str() {
        IMPORT_USER_JOB => import_user_job(&request.settings,
                                           PgPeopleSink,
                                           Arc::new(PgPeopleDirectory::new(Arc::clone(&provider))),
                                           &listeners)?,
        HELLO_JOB => hello_job(&listeners)?,
        other => return Err(unknown_job(other)),
    };
    let execution = launch_on(repository, job, request)?;
    trace_events(events.as_ref(), execution.id);
    Ok(execution)
}

fn launch_on<R>(repository: Arc<R>, job: Job<R::Conn>, request: &LaunchRequest) -> Result<JobExecution, BatchError>
    where R: JobRepository + 'static,
          R::Conn: 'static
{
    let launcher = JobLauncher::new(Arc::clone(&repository), request.mode);
    let job = Arc::new(job);
    let launched = if request.next {
        launcher.run_next(job, request.parameters.clone())?
    } else {
        launcher.run(job, request.parameters.clone())?
    };
    if request.mode == LaunchMode::Sync {
        return Ok(launched);
    }
    info!("launch:waiting execution={} timeout_secs={}", launched.id, request.wait_timeout.as_secs());
    JobOperator::new(repository).wait_for_completion(launched.id, Duration::from_millis(100), request.wait_timeout)
}

fn trace_events<E: EventStore>(events: &E, execution_id: Uuid) {
    match events.list(execution_id) {
        Ok(list) => {
            for event in list {
                debug!("event seq={} execution={} kind={}", event.seq, execution_id, event.kind.name());
            }
        }
        Err(e) => error!("event:list failed execution={execution_id}: {e}"),
    }
}

fn admin<F>(config: &AppConfig, op: F) -> ExitCode
    where F: FnOnce(&JobOperator<PgJobRepository<PoolProvider>>) -> Result<JobExecution, BatchError>
{
    let Some(db) = &config.database else {
        eprintln!("error: este comando requiere DATABASE_URL");
        return ExitCode::Configuration;
    };
    let result = build_pool(&db.url, db.min_connections, db.max_connections)
        .map_err(BatchError::from)
        .and_then(|pool| op(&JobOperator::new(Arc::new(PgJobRepository::new(PoolProvider::new(pool))))));
    match &result {
        Ok(execution) => {
            print_execution(execution);
            ExitCode::Completed
        }
        Err(_) => {
            report_launch(&result);
            exit_code_for(&result)
        }
    }
}

fn report_launch(result: &Result<JobExecution, BatchError>) {
    match result {
        Ok(execution) => print_execution(execution),
        Err(e) => {
            error!("launch:failed err={e}");
            eprintln!("error: {e}");
        }
    }
}

pub fn print_execution(execution: &JobExecution) {
    let summary = execution.summary();
    println!("job={} execution={} status={} exit={}",
             execution.job_name(),
             execution.id,
             execution.status,
             execution.exit_status);
    println!("  read={} write={} filter={} skip={} commit={} rollback={}",
             summary.read_count,
             summary.write_count,
             summary.filter_count,
             summary.skip_count,
             summary.commit_count,
             summary.rollback_count);
    for step in &execution.step_executions {
        println!("  step={} status={} exit={} read={} write={} filter={} skip={}",
                 step.step_name,
                 step.status,
                 step.exit_status.exit_code,
                 step.read_count,
                 step.write_count,
                 step.filter_count,
                 step.skip_count());
    }
    for failure in &execution.failures {
        println!("  failure: {failure}");
    }
}
