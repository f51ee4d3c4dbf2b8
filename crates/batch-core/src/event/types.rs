//! Tipos de evento y estructura `BatchEvent`.
//!
//! Los eventos son un registro de auditoría: el estado autoritativo sigue
//! siendo el del `JobRepository`. El enum `BatchEventKind` es el contrato
//! observable del motor; añadir variantes es compatible, renombrarlas no.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::BatchError;
use crate::model::{BatchStatus, ExecutionSummary, JobParameters};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchEventKind {
    JobStarted { job_name: String, parameters: JobParameters },
    StepStarted { step_name: String },
    ChunkCommitted {
        step_name: String,
        commit_count: u64,
        write_count: u64,
    },
    ChunkFailed { step_name: String, error: BatchError },
    StepFinished {
        step_name: String,
        status: BatchStatus,
        exit_code: String,
        read_count: u64,
        write_count: u64,
        filter_count: u64,
        skip_count: u64,
    },
    JobFinished {
        status: BatchStatus,
        exit_code: String,
        summary: ExecutionSummary,
    },
}

impl BatchEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            BatchEventKind::JobStarted { .. } => "JobStarted",
            BatchEventKind::StepStarted { .. } => "StepStarted",
            BatchEventKind::ChunkCommitted { .. } => "ChunkCommitted",
            BatchEventKind::ChunkFailed { .. } => "ChunkFailed",
            BatchEventKind::StepFinished { .. } => "StepFinished",
            BatchEventKind::JobFinished { .. } => "JobFinished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEvent {
    pub seq: u64, // asignado por el store (orden append)
    pub job_execution_id: Uuid,
    pub kind: BatchEventKind,
    pub ts: DateTime<Utc>,
}
