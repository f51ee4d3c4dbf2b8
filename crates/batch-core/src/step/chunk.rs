use std::sync::Mutex;

use log::debug;

use super::{Step, StepContext, StepOutcome, StepSettings};
use crate::chunk::{ChunkExecutor, ChunkOutcome, RetryPolicy, SkipPolicy};
use crate::constants::SOURCE_OFFSET_KEY;
use crate::errors::BatchError;
use crate::item::{ItemSink, ItemSource, ItemTransformer};
use crate::listener::SharedListener;
use crate::model::StepExecution;

/// Step que procesa una fuente en chunks de `chunk_size` registros.
/// Se construye con `StepBuilder::chunk`.
pub struct ChunkStep<I, O, C> {
    pub(crate) name: String,
    pub(crate) settings: StepSettings,
    pub(crate) chunk_size: usize,
    pub(crate) source: Mutex<Box<dyn ItemSource<I>>>,
    pub(crate) transformer: Box<dyn ItemTransformer<I, O>>,
    pub(crate) sink: Mutex<Box<dyn ItemSink<O, C>>>,
    pub(crate) skip_policy: SkipPolicy,
    pub(crate) retry_policy: RetryPolicy,
}

impl<I, O, C> ChunkStep<I, O, C> {
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

fn poisoned(step: &str, part: &str) -> BatchError {
    BatchError::Configuration(format!("step {step}: {part} lock poisoned by a previous panic"))
}

impl<I: 'static, O: 'static, C: 'static> Step<C> for ChunkStep<I, O, C> {
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
        let mut source = self.source.lock().map_err(|_| poisoned(&self.name, "source"))?;
        let mut sink = self.sink.lock().map_err(|_| poisoned(&self.name, "sink"))?;
        source.open(&execution.execution_context)?;
        debug!("step:open-source name={} offset={:?}",
               self.name,
               execution.execution_context.get_u64(SOURCE_OFFSET_KEY));

        let mut executor = ChunkExecutor { source: &mut *source,
                                           transformer: self.transformer.as_ref(),
                                           sink: &mut *sink,
                                           chunk_size: self.chunk_size,
                                           skip_policy: self.skip_policy,
                                           retry_policy: self.retry_policy,
                                           listeners,
                                           strict_listeners: self.settings.fail_on_listener_error };
        let outcome = executor.run(execution, ctx.repository);
        source.close();
        match outcome? {
            ChunkOutcome::Completed => Ok(StepOutcome::Completed),
            ChunkOutcome::Stopped => Ok(StepOutcome::Stopped),
        }
    }
}
