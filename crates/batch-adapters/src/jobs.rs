//! Definiciones de los jobs de ejemplo.
//!
//! - `helloJob`: un step `step` con un tasklet que imprime "hello world".
//! - `importUserJob`: un step `step1` por chunks que lee personas de un csv
//!   (`firstName,lastName`), las pasa a mayúsculas y las escribe en el sink
//!   recibido; al completar, un listener lista lo almacenado.
//!
//! Ambos llevan `RunIdIncrementer` para poder lanzar instancias nuevas con
//! `run.id` creciente. `extra` añade listeners a nivel de job (p.ej. la
//! bitácora de eventos).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use batch_core::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_RETRY_LIMIT};
use batch_core::{BatchError, ItemSink, Job, JobBuilder, RunIdIncrementer, SharedListener, StepBuilder};

use crate::delimited::DelimitedSource;
use crate::listeners::JobCompletionNotificationListener;
use crate::people::{PeopleDirectory, Person, UppercaseTransformer};
use crate::tasklets::HelloWorldTasklet;

pub const IMPORT_USER_JOB: &str = "importUserJob";
pub const HELLO_JOB: &str = "helloJob";

pub const PERSON_COLUMNS: [&str; 2] = ["firstName", "lastName"];

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub input: PathBuf,
    pub chunk_size: usize,
    /// 0 desactiva la política de skip.
    pub skip_limit: u32,
    pub retry_limit: u32,
    pub retry_backoff: Duration,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self { input: PathBuf::from("data/sample-data.csv"),
               chunk_size: DEFAULT_CHUNK_SIZE,
               skip_limit: 0,
               retry_limit: DEFAULT_RETRY_LIMIT,
               retry_backoff: Duration::from_millis(50) }
    }
}

pub fn import_user_job<C, S, D>(settings: &ImportSettings,
                                sink: S,
                                directory: Arc<D>,
                                extra: &[SharedListener])
                                -> Result<Job<C>, BatchError>
    where C: 'static,
          S: ItemSink<Person, C> + 'static,
          D: PeopleDirectory + 'static
{
    let mut step = StepBuilder::<C>::new("step1").chunk::<Person, Person>(settings.chunk_size)
                                                 .source(DelimitedSource::new(&settings.input, &PERSON_COLUMNS))
                                                 .transformer(UppercaseTransformer)
                                                 .sink(sink)
                                                 .retry(settings.retry_limit, settings.retry_backoff);
    if settings.skip_limit > 0 {
        step = step.skip_limit(settings.skip_limit);
    }
    let mut job = JobBuilder::new(IMPORT_USER_JOB).incrementer(RunIdIncrementer::new())
                                                  .listener(Arc::new(JobCompletionNotificationListener::new(directory)));
    for listener in extra {
        job = job.listener(Arc::clone(listener));
    }
    job.step(step.build()?).build()
}

pub fn hello_job<C: 'static>(extra: &[SharedListener]) -> Result<Job<C>, BatchError> {
    let mut job = JobBuilder::new(HELLO_JOB).incrementer(RunIdIncrementer::new());
    for listener in extra {
        job = job.listener(Arc::clone(listener));
    }
    job.step(StepBuilder::<C>::new("step").tasklet(HelloWorldTasklet::new())).build()
}
