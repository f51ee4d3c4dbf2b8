use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use batch_core::{BatchStatus, ExecutionListener, JobExecution, ListenerError};
use log::info;

use crate::people::PeopleDirectory;

/// Al terminar un job COMPLETED lista las personas almacenadas.
pub struct JobCompletionNotificationListener<D: PeopleDirectory> {
    directory: Arc<D>,
    reported: AtomicUsize,
}

impl<D: PeopleDirectory> JobCompletionNotificationListener<D> {
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory,
               reported: AtomicUsize::new(0) }
    }

    /// Filas listadas en el último informe.
    pub fn reported(&self) -> usize {
        self.reported.load(Ordering::SeqCst)
    }
}

impl<D: PeopleDirectory> ExecutionListener for JobCompletionNotificationListener<D> {
    fn after_job(&self, execution: &JobExecution) -> Result<(), ListenerError> {
        if execution.status != BatchStatus::Completed {
            return Ok(());
        }
        info!("!!! JOB FINISHED! Time to verify the results");
        let people = self.directory.all().map_err(|e| ListenerError::new(e.to_string()))?;
        for person in &people {
            info!("Found <{person}> in the database.");
        }
        self.reported.store(people.len(), Ordering::SeqCst);
        Ok(())
    }
}
