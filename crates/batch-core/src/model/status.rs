//! Estados de ejecución y códigos de salida.
//!
//! `BatchStatus` es la máquina de estados común a `JobExecution` y
//! `StepExecution`. Las transiciones válidas avanzan siempre hacia adelante:
//!
//! - `Starting` -> `Started` | `Stopping` | `Stopped` | `Failed` | `Unknown`
//! - `Started` -> `Stopping` | `Completed` | `Stopped` | `Failed` | `Unknown`
//! - `Stopping` -> `Stopped` | `Failed` | `Unknown`
//! - `Stopped` | `Failed` | `Unknown` -> `Abandoned`
//!
//! `Completed` y `Abandoned` son terminales absolutos.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Starting,
    Started,
    Completed,
    Failed,
    Stopping,
    Stopped,
    Abandoned,
    Unknown,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Starting => "STARTING",
            BatchStatus::Started => "STARTED",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Stopping => "STOPPING",
            BatchStatus::Stopped => "STOPPED",
            BatchStatus::Abandoned => "ABANDONED",
            BatchStatus::Unknown => "UNKNOWN",
        }
    }

    /// Rango de severidad usado por `upgrade_to`.
    fn rank(&self) -> u8 {
        match self {
            BatchStatus::Completed => 0,
            BatchStatus::Starting => 1,
            BatchStatus::Started => 2,
            BatchStatus::Stopping => 3,
            BatchStatus::Stopped => 4,
            BatchStatus::Failed => 5,
            BatchStatus::Abandoned => 6,
            BatchStatus::Unknown => 7,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, BatchStatus::Starting | BatchStatus::Started | BatchStatus::Stopping)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_running()
    }

    pub fn is_unsuccessful(&self) -> bool {
        self.rank() >= BatchStatus::Failed.rank()
    }

    /// Combina dos estados quedándose con el más avanzado. Un estado de
    /// ejecución nunca retrocede al fusionar una actualización concurrente
    /// (p.ej. `Stopping` solicitado por un operador frente a `Started`).
    pub fn upgrade_to(self, other: BatchStatus) -> BatchStatus {
        let started = BatchStatus::Started.rank();
        if self.rank() > started || other.rank() > started {
            return if self.rank() >= other.rank() { self } else { other };
        }
        if self == BatchStatus::Completed || other == BatchStatus::Completed {
            return BatchStatus::Completed;
        }
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }

    pub fn can_transition_to(&self, to: BatchStatus) -> bool {
        use BatchStatus::*;
        match (self, to) {
            (Starting, Started | Stopping | Stopped | Failed | Unknown) => true,
            (Started, Stopping | Completed | Stopped | Failed | Unknown) => true,
            (Stopping, Stopped | Failed | Unknown) => true,
            (Stopped | Failed | Unknown, Abandoned) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTING" => Ok(BatchStatus::Starting),
            "STARTED" => Ok(BatchStatus::Started),
            "COMPLETED" => Ok(BatchStatus::Completed),
            "FAILED" => Ok(BatchStatus::Failed),
            "STOPPING" => Ok(BatchStatus::Stopping),
            "STOPPED" => Ok(BatchStatus::Stopped),
            "ABANDONED" => Ok(BatchStatus::Abandoned),
            "UNKNOWN" => Ok(BatchStatus::Unknown),
            other => Err(format!("unknown batch status '{other}'")),
        }
    }
}

/// Código de salida de una ejecución. A diferencia de `BatchStatus` el código
/// es libre: los listeners `after_step` pueden devolver códigos propios que
/// luego se usan en las transiciones condicionales del job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    pub exit_code: String,
    pub exit_description: String,
}

impl ExitStatus {
    pub const EXECUTING: &'static str = "EXECUTING";
    pub const COMPLETED: &'static str = "COMPLETED";
    pub const NOOP: &'static str = "NOOP";
    pub const STOPPED: &'static str = "STOPPED";
    pub const FAILED: &'static str = "FAILED";
    pub const UNKNOWN: &'static str = "UNKNOWN";

    pub fn new(exit_code: impl Into<String>) -> Self {
        Self { exit_code: exit_code.into(),
               exit_description: String::new() }
    }

    pub fn executing() -> Self {
        Self::new(Self::EXECUTING)
    }
    pub fn completed() -> Self {
        Self::new(Self::COMPLETED)
    }
    pub fn noop() -> Self {
        Self::new(Self::NOOP)
    }
    pub fn stopped() -> Self {
        Self::new(Self::STOPPED)
    }
    pub fn failed() -> Self {
        Self::new(Self::FAILED)
    }
    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.exit_description = description.into();
        self
    }
}

impl From<BatchStatus> for ExitStatus {
    fn from(status: BatchStatus) -> Self {
        match status {
            BatchStatus::Completed => ExitStatus::completed(),
            BatchStatus::Failed | BatchStatus::Abandoned => ExitStatus::failed(),
            BatchStatus::Stopped | BatchStatus::Stopping => ExitStatus::stopped(),
            BatchStatus::Starting | BatchStatus::Started => ExitStatus::executing(),
            BatchStatus::Unknown => ExitStatus::unknown(),
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exit_description.is_empty() {
            f.write_str(&self.exit_code)
        } else {
            write!(f, "{} ({})", self.exit_code, self.exit_description)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_never_moves_backwards() {
        assert_eq!(BatchStatus::Started.upgrade_to(BatchStatus::Stopping), BatchStatus::Stopping);
        assert_eq!(BatchStatus::Stopping.upgrade_to(BatchStatus::Started), BatchStatus::Stopping);
        assert_eq!(BatchStatus::Starting.upgrade_to(BatchStatus::Completed), BatchStatus::Completed);
        assert_eq!(BatchStatus::Failed.upgrade_to(BatchStatus::Completed), BatchStatus::Failed);
    }

    #[test]
    fn transitions_are_forward_only() {
        assert!(BatchStatus::Starting.can_transition_to(BatchStatus::Started));
        assert!(BatchStatus::Started.can_transition_to(BatchStatus::Completed));
        assert!(!BatchStatus::Completed.can_transition_to(BatchStatus::Started));
        assert!(!BatchStatus::Failed.can_transition_to(BatchStatus::Started));
        assert!(!BatchStatus::Stopping.can_transition_to(BatchStatus::Completed));
        assert!(BatchStatus::Failed.can_transition_to(BatchStatus::Abandoned));
    }

    #[test]
    fn status_roundtrips_through_text() {
        for s in [BatchStatus::Starting,
                  BatchStatus::Started,
                  BatchStatus::Completed,
                  BatchStatus::Failed,
                  BatchStatus::Stopping,
                  BatchStatus::Stopped,
                  BatchStatus::Abandoned,
                  BatchStatus::Unknown]
        {
            assert_eq!(s.as_str().parse::<BatchStatus>(), Ok(s));
        }
    }
}
