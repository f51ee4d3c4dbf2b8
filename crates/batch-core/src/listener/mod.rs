//! Hooks de ciclo de vida de jobs, steps y chunks.
//!
//! Todos los hooks tienen implementación vacía por defecto. Un listener que
//! falla (error o pánico) se registra en el log y se ignora; sólo si el step o
//! el job se construyó con `fail_on_listener_error` el fallo se propaga y
//! marca la ejecución como FAILED.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::error;
use thiserror::Error;

use crate::errors::BatchError;
use crate::model::{ExitStatus, JobExecution, StepExecution};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub trait ExecutionListener: Send + Sync {
    fn before_job(&self, _execution: &JobExecution) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Recibe la ejecución con su estado final ya calculado.
    fn after_job(&self, _execution: &JobExecution) -> Result<(), ListenerError> {
        Ok(())
    }

    fn before_step(&self, _execution: &StepExecution) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Puede sustituir el `ExitStatus` del step devolviendo `Some`. El último
    /// listener que devuelva un valor gana.
    fn after_step(&self, _execution: &StepExecution) -> Result<Option<ExitStatus>, ListenerError> {
        Ok(None)
    }

    fn after_chunk(&self, _execution: &StepExecution) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_chunk_error(&self, _execution: &StepExecution, _error: &BatchError) -> Result<(), ListenerError> {
        Ok(())
    }
}

pub type SharedListener = Arc<dyn ExecutionListener>;

/// Ejecuta un hook aislando errores y pánicos.
///
/// Devuelve `Ok(Some(v))` si el hook terminó bien, `Ok(None)` si falló en modo
/// tolerante y `Err(BatchError::Listener)` si falló en modo estricto.
pub(crate) fn invoke<T>(hook: &str,
                        strict: bool,
                        call: impl FnOnce() -> Result<T, ListenerError>)
                        -> Result<Option<T>, BatchError> {
    let message = match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => return Ok(Some(value)),
        Ok(Err(err)) => err.0,
        Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
    };
    error!("listener:{hook} failed err={message}");
    if strict {
        Err(BatchError::Listener(format!("{hook}: {message}")))
    } else {
        Ok(None)
    }
}

/// Notifica a todos los listeners. En modo estricto todos se ejecutan y se
/// devuelve el primer fallo.
pub(crate) fn notify_all(listeners: &[SharedListener],
                         hook: &str,
                         strict: bool,
                         call: impl Fn(&dyn ExecutionListener) -> Result<(), ListenerError>)
                         -> Result<(), BatchError> {
    let mut first_failure = None;
    for listener in listeners {
        if let Err(e) = invoke(hook, strict, || call(listener.as_ref())) {
            first_failure.get_or_insert(e);
        }
    }
    match first_failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
