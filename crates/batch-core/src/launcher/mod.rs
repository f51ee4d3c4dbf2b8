//! Lanzamiento y operación de jobs.
//!
//! `JobLauncher` crea la ejecución (aplicando las reglas de relanzamiento del
//! repositorio) y la ejecuta en el hilo llamante (`LaunchMode::Sync`) o en un
//! hilo dedicado (`LaunchMode::Async`). En modo asíncrono se devuelve la
//! ejecución en STARTING y el llamante consulta el repositorio.

mod exit;
mod operator;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use log::{error, info};

use crate::errors::BatchError;
use crate::job::Job;
use crate::model::{JobExecution, JobParameters};
use crate::repo::JobRepository;

pub use exit::{exit_code_for, ExitCode};
pub use operator::JobOperator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaunchMode {
    #[default]
    Sync,
    Async,
}

impl FromStr for LaunchMode {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(LaunchMode::Sync),
            "async" => Ok(LaunchMode::Async),
            other => Err(BatchError::Configuration(format!("unknown launch mode '{other}'"))),
        }
    }
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
                        LaunchMode::Sync => "sync",
                        LaunchMode::Async => "async",
                    })
    }
}

pub struct JobLauncher<R: JobRepository> {
    repository: Arc<R>,
    mode: LaunchMode,
}

impl<R> JobLauncher<R>
    where R: JobRepository + 'static,
          R::Conn: 'static
{
    pub fn new(repository: Arc<R>, mode: LaunchMode) -> Self {
        Self { repository, mode }
    }

    pub fn mode(&self) -> LaunchMode {
        self.mode
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Valida parámetros, registra la ejecución y la ejecuta según el modo.
    ///
    /// Errores de lanzamiento (`JobInstanceAlreadyComplete`,
    /// `JobExecutionAlreadyRunning`, `Restart`, validación) se devuelven sin
    /// crear ninguna ejecución.
    pub fn run(&self, job: Arc<Job<R::Conn>>, parameters: JobParameters) -> Result<JobExecution, BatchError> {
        job.validate(&parameters)?;
        let execution = self.repository
                            .create_job_execution(job.name(), &parameters, job.is_restartable())?;
        info!("launcher:launch job={} execution={} mode={}", job.name(), execution.id, self.mode);
        match self.mode {
            LaunchMode::Sync => {
                let mut execution = execution;
                job.execute(&mut execution, self.repository.as_ref())?;
                Ok(execution)
            }
            LaunchMode::Async => {
                let repository = Arc::clone(&self.repository);
                let mut running = execution.clone();
                thread::Builder::new().name(format!("batch-{}", job.name()))
                                      .spawn(move || {
                                          if let Err(e) = job.execute(&mut running, repository.as_ref()) {
                                              error!("launcher:async-failed job={} execution={} err={}",
                                                     job.name(), running.id, e);
                                          }
                                      })
                                      .map_err(|e| BatchError::Configuration(format!("cannot spawn job thread: {e}")))?;
                Ok(execution)
            }
        }
    }

    /// Lanza la siguiente instancia según el incrementer del job, partiendo
    /// de los parámetros de su última ejecución y añadiendo `extra`.
    pub fn run_next(&self, job: Arc<Job<R::Conn>>, extra: JobParameters) -> Result<JobExecution, BatchError> {
        if !job.has_incrementer() {
            return Err(BatchError::Configuration(format!("job {} has no parameters incrementer", job.name())));
        }
        let last = self.repository.find_latest_job_execution(job.name())?;
        let mut parameters = job.next_parameters(last.as_ref().map(|e| &e.parameters));
        for (name, parameter) in extra.iter() {
            parameters.insert(name.clone(), parameter.clone());
        }
        self.run(job, parameters)
    }
}
