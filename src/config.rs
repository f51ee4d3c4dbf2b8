//! Configuración central de la aplicación.
//! Carga variables de entorno (.env, una sola vez) y expone una estructura
//! inmutable con los valores por defecto del motor. Los flags de la CLI tienen
//! prioridad sobre estos valores.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use batch_core::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_RETRY_LIMIT};
use batch_core::{BatchError, LaunchMode};
use batch_persistence::{init_dotenv, DbConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub chunk_size: usize,
    pub launch_mode: LaunchMode,
    /// Intentos de escritura por chunk.
    pub retry_limit: u32,
    /// 0 = sin política de skip.
    pub skip_limit: u32,
    pub input: PathBuf,
    /// Espera máxima de un lanzamiento asíncrono antes de devolver el control.
    pub wait_timeout: Duration,
    /// `None` = repositorio en memoria.
    pub database: Option<DbConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE,
               launch_mode: LaunchMode::Sync,
               retry_limit: DEFAULT_RETRY_LIMIT,
               skip_limit: 0,
               input: PathBuf::from("data/sample-data.csv"),
               wait_timeout: Duration::from_secs(600),
               database: None }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, BatchError> {
        init_dotenv();
        let defaults = Self::default();
        let database = DbConfig::from_env_optional().map_err(|e| BatchError::Configuration(e.to_string()))?;
        Ok(Self { chunk_size: env_or("BATCH_CHUNK_SIZE", defaults.chunk_size)?,
                  launch_mode: env_or("BATCH_LAUNCH_MODE", defaults.launch_mode)?,
                  retry_limit: env_or("BATCH_RETRY_LIMIT", defaults.retry_limit)?,
                  skip_limit: env_or("BATCH_SKIP_LIMIT", defaults.skip_limit)?,
                  input: env::var("BATCH_INPUT").map(PathBuf::from).unwrap_or(defaults.input),
                  wait_timeout: Duration::from_secs(env_or("BATCH_WAIT_TIMEOUT_SECS", defaults.wait_timeout.as_secs())?),
                  database })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, BatchError> {
    match env::var(key) {
        Ok(raw) => raw.trim()
                      .parse()
                      .map_err(|_| BatchError::Configuration(format!("{key} inválido: '{raw}'"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_engine_constants() {
        let config = AppConfig::default();
        assert_eq!(config.retry_limit, DEFAULT_RETRY_LIMIT);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(batch_adapters::ImportSettings::default().retry_limit, config.retry_limit);
    }

    #[test]
    fn env_values_override_defaults() {
        env::set_var("BATCH_TEST_CHUNK", "25");
        assert_eq!(env_or("BATCH_TEST_CHUNK", 10usize).expect("parse"), 25);
        assert_eq!(env_or("BATCH_TEST_MISSING", 7u32).expect("default"), 7);
        env::set_var("BATCH_TEST_MODE", "async");
        assert_eq!(env_or("BATCH_TEST_MODE", LaunchMode::Sync).expect("mode"), LaunchMode::Async);
        env::set_var("BATCH_TEST_BAD", "many");
        assert!(matches!(env_or("BATCH_TEST_BAD", 1u32), Err(BatchError::Configuration(_))));
    }
}
