//! Jobs: secuencia de steps con transiciones condicionales.
//!
//! Reglas de ejecución:
//! - Los steps se ejecutan en orden; el siguiente nunca empieza antes de que
//!   el anterior termine (`end_time` fijado).
//! - En un reinicio, los steps cuya última ejecución en la instancia terminó
//!   COMPLETED se saltan (salvo `allow_start_if_complete`) y un step que
//!   falló se reanuda con el contexto de su ejecución previa.
//! - Entre steps se consulta la petición de stop del repositorio.
//! - Los fallos de steps quedan en `JobExecution::failures`; `execute` sólo
//!   devuelve `Err` ante errores de infraestructura que impiden registrar el
//!   resultado.

mod builder;
mod flow;
mod parameters;

use log::{error, info, warn};

use crate::errors::BatchError;
use crate::listener::{self, ExecutionListener, SharedListener};
use crate::model::{BatchStatus, ExitStatus, JobExecution, JobParameters};
use crate::repo::JobRepository;
use crate::step::{Step, StepContext};

pub use builder::JobBuilder;
pub use flow::{matches_pattern, Transition, TransitionRule};
use flow::{resolve, NextStep};
pub use parameters::{DefaultParametersValidator, JobParametersIncrementer, JobParametersValidator, RunIdIncrementer};

enum FlowEnd {
    Completed(ExitStatus),
    Failed { cause: Option<BatchError>, exit: ExitStatus },
    Stopped,
}

/// Resultado de un step visto desde el job.
struct StepResult {
    status: BatchStatus,
    exit: ExitStatus,
    error: Option<BatchError>,
}

pub struct Job<C> {
    name: String,
    steps: Vec<Box<dyn Step<C>>>,
    transitions: Vec<TransitionRule>,
    restartable: bool,
    listeners: Vec<SharedListener>,
    fail_on_listener_error: bool,
    validator: Option<Box<dyn JobParametersValidator>>,
    incrementer: Option<Box<dyn JobParametersIncrementer>>,
}

impl<C> Job<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_restartable(&self) -> bool {
        self.restartable
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn has_incrementer(&self) -> bool {
        self.incrementer.is_some()
    }

    pub fn validate(&self, parameters: &JobParameters) -> Result<(), BatchError> {
        match &self.validator {
            Some(v) => v.validate(parameters),
            None => Ok(()),
        }
    }

    /// Parámetros de la siguiente instancia según el incrementer. Sin
    /// incrementer se devuelven los parámetros previos tal cual.
    pub fn next_parameters(&self, previous: Option<&JobParameters>) -> JobParameters {
        match &self.incrementer {
            Some(inc) => inc.next(previous),
            None => previous.cloned().unwrap_or_default(),
        }
    }

    /// Lanzamiento síncrono: valida, crea la ejecución y la ejecuta.
    pub fn run(&self,
               parameters: JobParameters,
               repository: &dyn JobRepository<Conn = C>)
               -> Result<JobExecution, BatchError> {
        self.validate(&parameters)?;
        let mut execution = repository.create_job_execution(&self.name, &parameters, self.restartable)?;
        self.execute(&mut execution, repository)?;
        Ok(execution)
    }

    /// Ejecuta una `JobExecution` ya registrada (estado STARTING).
    pub fn execute(&self,
                   execution: &mut JobExecution,
                   repository: &dyn JobRepository<Conn = C>)
                   -> Result<(), BatchError> {
        let strict = self.fail_on_listener_error;
        execution.mark_started()?;
        repository.update_job_execution(execution)?;
        info!("job:start name={} execution={} instance={} params={}",
              self.name, execution.id, execution.instance.id, execution.parameters);

        let current: &JobExecution = execution;
        let end = match listener::notify_all(&self.listeners, "before_job", strict, |l: &dyn ExecutionListener| {
                      l.before_job(current)
                  }) {
            Ok(()) => self.run_flow(execution, repository),
            Err(e) => FlowEnd::Failed { exit: ExitStatus::failed().with_description(e.to_string()),
                                        cause: Some(e) },
        };

        let (mut status, mut exit, mut cause) = match end {
            FlowEnd::Completed(exit) => (BatchStatus::Completed, exit, None),
            FlowEnd::Stopped => (BatchStatus::Stopped, ExitStatus::stopped(), None),
            FlowEnd::Failed { cause, exit } => (BatchStatus::Failed, exit, cause),
        };
        if status == BatchStatus::Completed && execution.status == BatchStatus::Stopping {
            status = BatchStatus::Stopped;
            exit = ExitStatus::stopped();
        }

        let mut preview = execution.clone();
        preview.status = status;
        preview.exit_status = exit.clone();
        if let Err(e) = listener::notify_all(&self.listeners, "after_job", strict, |l| l.after_job(&preview)) {
            if cause.is_none() && status != BatchStatus::Stopped {
                status = BatchStatus::Failed;
                exit = ExitStatus::failed().with_description(e.to_string());
                cause = Some(e);
            }
        }

        if let Some(e) = cause {
            execution.add_failure(e)?;
        }
        execution.finish(status, exit)?;
        if let Err(e) = repository.update_job_execution(execution) {
            error!("job:persist-failed name={} execution={} err={}", self.name, execution.id, e);
            return Err(e);
        }
        let summary = execution.summary();
        info!("job:end name={} execution={} status={} exit={} read={} write={} skip={} commit={} rollback={}",
              self.name,
              execution.id,
              execution.status,
              execution.exit_status.exit_code,
              summary.read_count,
              summary.write_count,
              summary.skip_count,
              summary.commit_count,
              summary.rollback_count);
        Ok(())
    }

    fn run_flow(&self, execution: &mut JobExecution, repository: &dyn JobRepository<Conn = C>) -> FlowEnd {
        let names = self.step_names();
        let mut index = 0usize;
        loop {
            match repository.is_stop_requested(execution.id) {
                Ok(true) => {
                    info!("job:stop name={} execution={} before_step={}", self.name, execution.id, names[index]);
                    return FlowEnd::Stopped;
                }
                Ok(false) => {}
                Err(e) => return infra_failure(e),
            }
            let step = self.steps[index].as_ref();
            let result = match self.run_step(step, execution, repository) {
                Ok(r) => r,
                Err(e) => return infra_failure(e),
            };
            if let Err(e) = repository.update_job_execution(execution) {
                return infra_failure(e);
            }
            match resolve(&self.transitions, &names, index, result.status, &result.exit) {
                NextStep::Step(next) => {
                    if let Some(e) = &result.error {
                        warn!("job:recover name={} failed_step={} next={} err={}",
                              self.name, names[index], names[next], e);
                    }
                    index = next;
                }
                NextStep::End(exit) => return FlowEnd::Completed(exit),
                NextStep::Fail(exit) => {
                    return FlowEnd::Failed { cause: result.error,
                                             exit }
                }
                NextStep::Stop => return FlowEnd::Stopped,
            }
        }
    }

    fn run_step(&self,
                step: &dyn Step<C>,
                execution: &mut JobExecution,
                repository: &dyn JobRepository<Conn = C>)
                -> Result<StepResult, BatchError> {
        let settings = step.settings();
        let last = repository.find_last_step_execution(execution.instance.id, step.name())?;
        if let Some(prev) = &last {
            if prev.status == BatchStatus::Completed
               && prev.job_execution_id != execution.id
               && !settings.allow_start_if_complete
            {
                info!("step:skip-completed name={} previous_execution={}", step.name(), prev.id);
                return Ok(StepResult { status: BatchStatus::Completed,
                                       exit: prev.exit_status.clone(),
                                       error: None });
            }
        }
        let starts = repository.count_step_executions(execution.instance.id, step.name())?;
        if starts >= settings.start_limit {
            let error = BatchError::StartLimitExceeded { step_name: step.name().to_string(),
                                                         limit: settings.start_limit };
            warn!("step:start-limit name={} starts={}", step.name(), starts);
            return Ok(StepResult { status: BatchStatus::Failed,
                                   exit: ExitStatus::failed().with_description(error.to_string()),
                                   error: Some(error) });
        }
        let context = match &last {
            Some(prev) if prev.status != BatchStatus::Completed => prev.execution_context.clone(),
            _ => Default::default(),
        };

        let mut step_execution = repository.create_step_execution(execution, step.name(), context)?;
        let mut job_context = std::mem::take(&mut execution.execution_context);
        let outcome = {
            let mut ctx = StepContext { repository,
                                        job_context: &mut job_context,
                                        job_listeners: &self.listeners };
            step.execute(&mut step_execution, &mut ctx)
        };
        execution.execution_context = job_context;
        let result = StepResult { status: step_execution.status,
                                  exit: step_execution.exit_status.clone(),
                                  error: outcome.err() };
        let still_running = step_execution.status == BatchStatus::Started;
        execution.step_executions.push(step_execution);
        if still_running {
            // el step abortó antes de cerrar su ejecución
            return Err(result.error
                             .unwrap_or_else(|| BatchError::Repository(format!("step {} left running", step.name()))));
        }
        Ok(result)
    }
}

fn infra_failure(error: BatchError) -> FlowEnd {
    error!("job:infrastructure-error err={error}");
    FlowEnd::Failed { exit: ExitStatus::failed().with_description(error.to_string()),
                      cause: Some(error) }
}

impl<C> std::fmt::Debug for Job<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
         .field("name", &self.name)
         .field("steps", &self.step_names())
         .field("transitions", &self.transitions)
         .field("restartable", &self.restartable)
         .finish()
    }
}
