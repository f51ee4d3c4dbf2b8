use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use batch_core::{BatchError, RepeatStatus, StepContribution, Tasklet};
use log::info;

/// Imprime un mensaje y termina en la primera invocación.
pub struct HelloWorldTasklet {
    message: String,
    invocations: Arc<AtomicUsize>,
}

impl HelloWorldTasklet {
    pub fn new() -> Self {
        Self::with_message("hello world")
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self { message: message.into(),
               invocations: Arc::new(AtomicUsize::new(0)) }
    }

    /// Contador compartido de invocaciones.
    pub fn invocations(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.invocations)
    }
}

impl Default for HelloWorldTasklet {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Tasklet<C> for HelloWorldTasklet {
    fn execute(&mut self, contribution: &mut StepContribution<'_>, _conn: &mut C) -> Result<RepeatStatus, BatchError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        println!("{}", self.message);
        info!("tasklet:hello step={}", contribution.step_execution.step_name);
        Ok(RepeatStatus::Finished)
    }
}
