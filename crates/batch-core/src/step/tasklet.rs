//! Steps de tarea única. El tasklet se invoca repetidamente hasta que
//! devuelve `RepeatStatus::Finished`; cada invocación corre en su propia
//! transacción del repositorio, así que sólo se confirma junto con su
//! actualización de la `StepExecution`.

use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use log::{debug, info, warn};

use super::{Step, StepContext, StepOutcome, StepSettings};
use crate::errors::BatchError;
use crate::listener::{self, panic_message, SharedListener};
use crate::model::{ExecutionContext, StepExecution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatStatus {
    Continuable,
    Finished,
}

/// Vista mutable que recibe el tasklet. Los cambios sólo se conservan si la
/// invocación se confirma.
pub struct StepContribution<'a> {
    pub step_execution: &'a mut StepExecution,
    pub job_context: &'a mut ExecutionContext,
}

pub trait Tasklet<C>: Send {
    fn execute(&mut self, contribution: &mut StepContribution<'_>, conn: &mut C) -> Result<RepeatStatus, BatchError>;
}

/// Tasklet a partir de una clausura.
pub struct FnTasklet<C, F> {
    f: F,
    _conn: PhantomData<fn(&mut C)>,
}

impl<C, F> FnTasklet<C, F>
    where F: FnMut(&mut StepContribution<'_>, &mut C) -> Result<RepeatStatus, BatchError> + Send
{
    pub fn new(f: F) -> Self {
        Self { f, _conn: PhantomData }
    }
}

impl<C, F> Tasklet<C> for FnTasklet<C, F>
    where F: FnMut(&mut StepContribution<'_>, &mut C) -> Result<RepeatStatus, BatchError> + Send
{
    fn execute(&mut self, contribution: &mut StepContribution<'_>, conn: &mut C) -> Result<RepeatStatus, BatchError> {
        (self.f)(contribution, conn)
    }
}

pub struct TaskletStep<C> {
    pub(crate) name: String,
    pub(crate) settings: StepSettings,
    pub(crate) tasklet: Mutex<Box<dyn Tasklet<C>>>,
}

impl<C: 'static> Step<C> for TaskletStep<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> &StepSettings {
        &self.settings
    }

    fn do_execute(&self,
                  execution: &mut StepExecution,
                  ctx: &mut StepContext<'_, C>,
                  listeners: &[SharedListener])
                  -> Result<StepOutcome, BatchError> {
        let strict = self.settings.fail_on_listener_error;
        let mut tasklet =
            self.tasklet
                .lock()
                .map_err(|_| BatchError::Configuration(format!("step {}: tasklet lock poisoned", self.name)))?;
        loop {
            let mut staged = execution.clone();
            let mut staged_job_context = ctx.job_context.clone();
            let mut repeat = RepeatStatus::Finished;
            let result = ctx.repository.commit_chunk(&mut |conn| {
                                           let mut contribution =
                                               StepContribution { step_execution: &mut staged,
                                                                  job_context: &mut staged_job_context };
                                           let call = catch_unwind(AssertUnwindSafe(|| {
                                                          tasklet.execute(&mut contribution, conn)
                                                      }));
                                           repeat = match call {
                                               Ok(r) => r?,
                                               Err(panic) => {
                                                   return Err(BatchError::Tasklet(panic_message(panic.as_ref())))
                                               }
                                           };
                                           staged.commit_count += 1;
                                           Ok(staged.clone())
                                       });
            match result {
                Ok(committed) => {
                    *execution = committed;
                    *ctx.job_context = staged_job_context;
                    debug!("tasklet:commit step={} commit={} repeat={:?}",
                           self.name, execution.commit_count, repeat);
                    let current: &StepExecution = execution;
                    listener::notify_all(listeners, "after_chunk", strict, |l| l.after_chunk(current))?;
                }
                Err(e) => {
                    execution.rollback_count += 1;
                    warn!("tasklet:rollback step={} err={}", self.name, e);
                    ctx.repository.update_step_execution(execution)?;
                    let current: &StepExecution = execution;
                    listener::notify_all(listeners, "on_chunk_error", strict, |l| l.on_chunk_error(current, &e))?;
                    return Err(e);
                }
            }
            if repeat == RepeatStatus::Finished {
                return Ok(StepOutcome::Completed);
            }
            if ctx.repository.is_stop_requested(execution.job_execution_id)? {
                info!("tasklet:stop step={} commit={}", self.name, execution.commit_count);
                return Ok(StepOutcome::Stopped);
            }
        }
    }
}
