//! Construcción de steps inmutables.
//!
//! ```ignore
//! let step = StepBuilder::<MemoryTransaction>::new("import")
//!     .chunk::<Person, Person>(10)
//!     .source(reader)
//!     .transformer(UppercaseTransformer)
//!     .sink(sink)
//!     .skip_limit(5)
//!     .build()?;
//! ```

use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::Duration;

use super::{ChunkStep, StepSettings, Tasklet, TaskletStep};
use crate::chunk::{RetryPolicy, SkipPolicy};
use crate::constants::DEFAULT_CHUNK_SIZE;
use crate::errors::BatchError;
use crate::item::{ItemSink, ItemSource, ItemTransformer};
use crate::listener::SharedListener;

pub struct StepBuilder<C> {
    name: String,
    settings: StepSettings,
    _conn: PhantomData<fn(&mut C)>,
}

impl<C: 'static> StepBuilder<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(),
               settings: StepSettings::default(),
               _conn: PhantomData }
    }

    pub fn listener(mut self, listener: SharedListener) -> Self {
        self.settings.listeners.push(listener);
        self
    }

    pub fn allow_start_if_complete(mut self, allow: bool) -> Self {
        self.settings.allow_start_if_complete = allow;
        self
    }

    pub fn start_limit(mut self, limit: u32) -> Self {
        self.settings.start_limit = limit;
        self
    }

    pub fn fail_on_listener_error(mut self, strict: bool) -> Self {
        self.settings.fail_on_listener_error = strict;
        self
    }

    pub fn promote_keys<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.settings.promote_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn chunk<I, O>(self, chunk_size: usize) -> ChunkStepBuilder<I, O, C> {
        ChunkStepBuilder { name: self.name,
                           settings: self.settings,
                           chunk_size,
                           source: None,
                           transformer: None,
                           sink: None,
                           skip_policy: SkipPolicy::none(),
                           retry_policy: RetryPolicy::default() }
    }

    pub fn tasklet(self, tasklet: impl Tasklet<C> + 'static) -> TaskletStep<C> {
        TaskletStep { name: self.name,
                      settings: self.settings,
                      tasklet: Mutex::new(Box::new(tasklet)) }
    }
}

pub struct ChunkStepBuilder<I, O, C> {
    name: String,
    settings: StepSettings,
    chunk_size: usize,
    source: Option<Box<dyn ItemSource<I>>>,
    transformer: Option<Box<dyn ItemTransformer<I, O>>>,
    sink: Option<Box<dyn ItemSink<O, C>>>,
    skip_policy: SkipPolicy,
    retry_policy: RetryPolicy,
}

impl<I: 'static, O: 'static, C: 'static> ChunkStepBuilder<I, O, C> {
    pub fn source(mut self, source: impl ItemSource<I> + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn transformer(mut self, transformer: impl ItemTransformer<I, O> + 'static) -> Self {
        self.transformer = Some(Box::new(transformer));
        self
    }

    pub fn sink(mut self, sink: impl ItemSink<O, C> + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn skip_limit(mut self, limit: u32) -> Self {
        self.skip_policy = SkipPolicy::limit(limit);
        self
    }

    pub fn retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.retry_policy = RetryPolicy::new(max_attempts, backoff);
        self
    }

    pub fn build(self) -> Result<ChunkStep<I, O, C>, BatchError> {
        let missing = |part: &str| BatchError::Configuration(format!("step {}: missing {part}", self.name));
        let source = self.source.ok_or_else(|| missing("source"))?;
        let transformer = self.transformer.ok_or_else(|| missing("transformer"))?;
        let sink = self.sink.ok_or_else(|| missing("sink"))?;
        if self.chunk_size == 0 {
            return Err(BatchError::Configuration(format!("step {}: chunk size must be positive (default {})",
                                                         self.name, DEFAULT_CHUNK_SIZE)));
        }
        Ok(ChunkStep { name: self.name,
                       settings: self.settings,
                       chunk_size: self.chunk_size,
                       source: Mutex::new(source),
                       transformer,
                       sink: Mutex::new(sink),
                       skip_policy: self.skip_policy,
                       retry_policy: self.retry_policy })
    }
}
