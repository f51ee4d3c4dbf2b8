//! Steps: unidades de trabajo secuenciales de un job.
//!
//! Un `Step` concreto sólo implementa `do_execute`; el método provisto
//! `execute` se encarga del ciclo de vida común:
//!
//! 1. STARTING -> STARTED y persistencia.
//! 2. `before_step` de los listeners (job + step).
//! 3. `do_execute` (chunks o tasklet).
//! 4. `after_step` sobre una vista previa con el estado final; puede cambiar
//!    el `ExitStatus`.
//! 5. Promoción de claves al contexto del job, `end_time` y persistencia.
//!
//! Al volver, la ejecución nunca queda en STARTED.

mod builder;
mod chunk;
mod tasklet;

use std::sync::Arc;

use log::{error, info};

use crate::errors::BatchError;
use crate::listener::{self, ExecutionListener, SharedListener};
use crate::model::{BatchStatus, ExecutionContext, ExitStatus, StepExecution};
use crate::repo::JobRepository;

pub use builder::{ChunkStepBuilder, StepBuilder};
pub use chunk::ChunkStep;
pub use tasklet::{FnTasklet, RepeatStatus, StepContribution, Tasklet, TaskletStep};

/// Resultado no erróneo de `do_execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Stopped,
}

/// Configuración común a todos los steps.
#[derive(Clone)]
pub struct StepSettings {
    pub allow_start_if_complete: bool,
    pub start_limit: u32,
    pub listeners: Vec<SharedListener>,
    pub fail_on_listener_error: bool,
    /// Claves del contexto del step que se copian al del job al completar.
    pub promote_keys: Vec<String>,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self { allow_start_if_complete: false,
               start_limit: u32::MAX,
               listeners: Vec::new(),
               fail_on_listener_error: false,
               promote_keys: Vec::new() }
    }
}

/// Lo que el job presta a un step mientras se ejecuta.
pub struct StepContext<'a, C> {
    pub repository: &'a dyn JobRepository<Conn = C>,
    pub job_context: &'a mut ExecutionContext,
    pub job_listeners: &'a [SharedListener],
}

pub trait Step<C>: Send + Sync {
    fn name(&self) -> &str;

    fn settings(&self) -> &StepSettings;

    fn do_execute(&self,
                  execution: &mut StepExecution,
                  ctx: &mut StepContext<'_, C>,
                  listeners: &[SharedListener])
                  -> Result<StepOutcome, BatchError>;

    /// Devuelve `Err` con la causa si el step terminó FAILED.
    fn execute(&self, execution: &mut StepExecution, ctx: &mut StepContext<'_, C>) -> Result<(), BatchError> {
        run_step(self, execution, ctx)
    }
}

fn run_step<C, S>(step: &S, execution: &mut StepExecution, ctx: &mut StepContext<'_, C>) -> Result<(), BatchError>
    where S: Step<C> + ?Sized
{
    let settings = step.settings();
    let strict = settings.fail_on_listener_error;
    let listeners: Vec<SharedListener> = ctx.job_listeners
                                            .iter()
                                            .chain(settings.listeners.iter())
                                            .map(Arc::clone)
                                            .collect();

    execution.mark_started()?;
    info!("step:start name={} execution={} job_execution={}",
          execution.step_name, execution.id, execution.job_execution_id);
    let outcome = start(step, execution, ctx, &listeners, strict);

    let (mut status, mut exit) = match &outcome {
        Ok(StepOutcome::Completed) => (BatchStatus::Completed, ExitStatus::completed()),
        Ok(StepOutcome::Stopped) => (BatchStatus::Stopped, ExitStatus::stopped()),
        Err(e) => (BatchStatus::Failed, ExitStatus::failed().with_description(e.to_string())),
    };
    let mut failure = outcome.err();

    let mut preview = execution.clone();
    preview.status = status;
    preview.exit_status = exit.clone();
    for l in &listeners {
        match listener::invoke("after_step", strict, || l.after_step(&preview)) {
            Ok(Some(Some(custom))) => {
                exit = custom;
                preview.exit_status = exit.clone();
            }
            Ok(_) => {}
            Err(e) => {
                if failure.is_none() {
                    status = BatchStatus::Failed;
                    exit = ExitStatus::failed().with_description(e.to_string());
                    failure = Some(e);
                }
            }
        }
    }

    if status == BatchStatus::Completed {
        execution.execution_context.promote_into(&settings.promote_keys, ctx.job_context);
    }
    if let Some(e) = &failure {
        execution.add_failure(e.clone())?;
    }
    execution.finish(status, exit)?;
    if let Err(e) = ctx.repository.update_step_execution(execution) {
        error!("step:persist-failed name={} err={}", execution.step_name, e);
        return Err(e);
    }
    info!("step:end name={} status={} exit={} read={} write={} filter={} skip={} commit={} rollback={}",
          execution.step_name,
          execution.status,
          execution.exit_status.exit_code,
          execution.read_count,
          execution.write_count,
          execution.filter_count,
          execution.skip_count(),
          execution.commit_count,
          execution.rollback_count);
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn start<C, S>(step: &S,
               execution: &mut StepExecution,
               ctx: &mut StepContext<'_, C>,
               listeners: &[SharedListener],
               strict: bool)
               -> Result<StepOutcome, BatchError>
    where S: Step<C> + ?Sized
{
    ctx.repository.update_step_execution(execution)?;
    let current: &StepExecution = execution;
    listener::notify_all(listeners, "before_step", strict, |l: &dyn ExecutionListener| l.before_step(current))?;
    step.do_execute(execution, ctx, listeners)
}
