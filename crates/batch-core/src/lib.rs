//! batch-core: motor de procesamiento batch por chunks con metadatos
//! reiniciables.
pub mod chunk;
pub mod constants;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod item;
pub mod job;
pub mod launcher;
pub mod listener;
pub mod model;
pub mod repo;
pub mod step;

pub use chunk::{RetryPolicy, SkipPolicy};
pub use errors::{BatchError, SinkError, SourceError, TransformError};
pub use event::{BatchEvent, BatchEventKind, EventLogListener, EventStore, InMemoryEventStore};
pub use item::{FnTransformer, ItemSink, ItemSource, ItemTransformer, IterSource, PassThrough, SharedVecSink, Transformed};
pub use job::{DefaultParametersValidator, Job, JobBuilder, JobParametersIncrementer, JobParametersValidator, RunIdIncrementer,
              Transition};
pub use launcher::{exit_code_for, ExitCode, JobLauncher, JobOperator, LaunchMode};
pub use listener::{ExecutionListener, ListenerError, SharedListener};
pub use model::{BatchStatus, ExecutionContext, ExecutionSummary, ExitStatus, JobExecution, JobInstance, JobParameter,
                JobParameters, ParameterValue, StepExecution};
pub use repo::{InMemoryJobRepository, JobRepository, MemoryTransaction};
pub use step::{ChunkStep, FnTasklet, RepeatStatus, Step, StepBuilder, StepContribution, Tasklet, TaskletStep};
