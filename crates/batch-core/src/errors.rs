//! Errores del motor batch.
//!
//! Los errores por ítem (`SourceError`, `TransformError`) son recuperables
//! según la política de skip del step. `SinkError` siempre aborta la
//! transacción del chunk. `BatchError` agrega todo lo que puede terminar un
//! step o un job y viaja serializado en los detalles de fallo.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::BatchStatus;

/// Registro ilegible o malformado en la fuente.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum SourceError {
    #[error("malformed record at line {line}: {reason}")]
    Malformed { line: u64, reason: String },
    #[error("unreadable source: {0}")]
    Unreadable(String),
}

/// Fallo al transformar un único ítem.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum TransformError {
    #[error("item rejected: {0}")]
    Rejected(String),
    #[error("transformer panicked: {0}")]
    Panicked(String),
}

/// Fallo al persistir un chunk completo.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum SinkError {
    #[error("write failed: {0}")]
    Write(String),
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, PartialEq, Clone, Serialize, Deserialize)]
pub enum BatchError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("job instance already complete: job={job_name} key={job_key}")]
    JobInstanceAlreadyComplete { job_name: String, job_key: String },
    #[error("job execution already running: job={job_name} execution={execution_id}")]
    JobExecutionAlreadyRunning { job_name: String, execution_id: uuid::Uuid },
    #[error("restart refused: {0}")]
    Restart(String),
    #[error("start limit exceeded for step {step_name} (limit {limit})")]
    StartLimitExceeded { step_name: String, limit: u32 },
    #[error("skip limit {limit} exceeded: {cause}")]
    SkipLimitExceeded { limit: u32, cause: String },
    #[error("chunk write failed after {attempts} attempts: {cause}")]
    RetryExhausted { attempts: u32, cause: SinkError },
    #[error("invalid status transition {from:?} -> {to:?}")]
    InvalidTransition { from: BatchStatus, to: BatchStatus },
    #[error("execution already ended, no further mutation allowed")]
    ExecutionClosed,
    #[error("stale version for {entity} {id} (expected {expected}, found {found})")]
    OptimisticLock { entity: String, id: uuid::Uuid, expected: i32, found: i32 },
    #[error("repository: {0}")]
    Repository(String),
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("tasklet failed: {0}")]
    Tasklet(String),
    #[error("listener failed: {0}")]
    Listener(String),
}

impl BatchError {
    /// Indica si el error corresponde a un fallo por ítem que la política de
    /// skip puede absorber.
    pub fn is_item_error(&self) -> bool {
        matches!(self, BatchError::Source(_) | BatchError::Transform(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_errors_are_classified() {
        assert!(BatchError::from(SourceError::Unreadable("x".into())).is_item_error());
        assert!(BatchError::from(TransformError::Rejected("x".into())).is_item_error());
        assert!(!BatchError::from(SinkError::Write("x".into())).is_item_error());
    }

    #[test]
    fn display_formats() {
        let e = BatchError::JobInstanceAlreadyComplete { job_name: "job".into(),
                                                         job_key: "abc".into() };
        assert_eq!(e.to_string(), "job instance already complete: job=job key=abc");
        let s = SourceError::Malformed { line: 3, reason: "bad".into() };
        assert_eq!(s.to_string(), "malformed record at line 3: bad");
    }

    #[test]
    fn errors_roundtrip_json() {
        let e = BatchError::RetryExhausted { attempts: 3,
                                             cause: SinkError::Write("db down".into()) };
        let v = serde_json::to_value(&e).expect("serialize");
        let back: BatchError = serde_json::from_value(v).expect("deserialize");
        assert_eq!(back, e);
    }
}
