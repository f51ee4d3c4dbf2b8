//! Modelos del dominio batch: parámetros, estados, contexto y ejecuciones.

pub mod context;
pub mod execution;
pub mod params;
pub mod status;

pub use context::ExecutionContext;
pub use execution::{ExecutionSummary, JobExecution, JobInstance, StepExecution};
pub use params::{JobParameter, JobParameters, ParameterValue};
pub use status::{BatchStatus, ExitStatus};
