//! Incrementers y validadores de parámetros.

use crate::constants::RUN_ID_KEY;
use crate::errors::BatchError;
use crate::model::{JobParameter, JobParameters, ParameterValue};

/// Deriva los parámetros de la siguiente instancia a partir de los de la
/// última ejecución del job.
pub trait JobParametersIncrementer: Send + Sync {
    fn next(&self, previous: Option<&JobParameters>) -> JobParameters;
}

/// Incrementa un parámetro identificador `run.id` (1 si no existía).
#[derive(Debug, Clone)]
pub struct RunIdIncrementer {
    key: String,
}

impl Default for RunIdIncrementer {
    fn default() -> Self {
        Self { key: RUN_ID_KEY.to_string() }
    }
}

impl RunIdIncrementer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl JobParametersIncrementer for RunIdIncrementer {
    fn next(&self, previous: Option<&JobParameters>) -> JobParameters {
        let mut params = previous.cloned().unwrap_or_default();
        let id = params.get_long(&self.key).unwrap_or(0) + 1;
        params.insert(self.key.clone(), JobParameter::identifying(ParameterValue::Long(id)));
        params
    }
}

pub trait JobParametersValidator: Send + Sync {
    fn validate(&self, parameters: &JobParameters) -> Result<(), BatchError>;
}

/// Exige claves obligatorias y, si hay claves opcionales declaradas, rechaza
/// cualquier clave desconocida.
#[derive(Debug, Clone, Default)]
pub struct DefaultParametersValidator {
    required: Vec<String>,
    optional: Vec<String>,
}

impl DefaultParametersValidator {
    pub fn new<R, O>(required: impl IntoIterator<Item = R>, optional: impl IntoIterator<Item = O>) -> Self
        where R: Into<String>,
              O: Into<String>
    {
        Self { required: required.into_iter().map(Into::into).collect(),
               optional: optional.into_iter().map(Into::into).collect() }
    }
}

impl JobParametersValidator for DefaultParametersValidator {
    fn validate(&self, parameters: &JobParameters) -> Result<(), BatchError> {
        let missing: Vec<&str> = self.required
                                     .iter()
                                     .filter(|k| !parameters.contains(k))
                                     .map(String::as_str)
                                     .collect();
        if !missing.is_empty() {
            return Err(BatchError::Configuration(format!("missing required parameters: {}", missing.join(", "))));
        }
        if self.optional.is_empty() {
            return Ok(());
        }
        let unknown: Vec<&str> = parameters.iter()
                                           .map(|(k, _)| k.as_str())
                                           .filter(|k| !self.required.iter().any(|r| r == k))
                                           .filter(|k| !self.optional.iter().any(|o| o == k))
                                           .collect();
        if !unknown.is_empty() {
            return Err(BatchError::Configuration(format!("unknown parameters: {}", unknown.join(", "))));
        }
        Ok(())
    }
}
