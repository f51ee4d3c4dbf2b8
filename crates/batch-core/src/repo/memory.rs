//! Repositorio en memoria. Útil para tests y para ejecuciones efímeras.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use indexmap::IndexMap;
use log::{debug, info};
use uuid::Uuid;

use super::{check_relaunch, merge_job_status, stale, JobRepository};
use crate::errors::BatchError;
use crate::model::{BatchStatus, ExecutionContext, JobExecution, JobInstance, JobParameters, StepExecution};

/// Transacción en memoria: los sinks registran efectos que sólo se aplican
/// en `commit`. Descartar la transacción equivale a rollback.
#[derive(Default)]
pub struct MemoryTransaction {
    pending: Vec<Box<dyn FnOnce() + Send>>,
}

impl MemoryTransaction {
    pub fn on_commit(&mut self, effect: impl FnOnce() + Send + 'static) {
        self.pending.push(Box::new(effect));
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn commit(self) {
        for effect in self.pending {
            effect();
        }
    }
}

#[derive(Default)]
struct MemoryState {
    instances: IndexMap<(String, String), JobInstance>,
    job_executions: IndexMap<Uuid, JobExecution>,
    step_executions: IndexMap<Uuid, StepExecution>,
}

impl MemoryState {
    fn executions_of(&self, instance_id: Uuid) -> impl Iterator<Item = &JobExecution> {
        self.job_executions.values().filter(move |e| e.instance.id == instance_id)
    }

    fn steps_of(&self, instance_id: Uuid, step_name: &str) -> Vec<&StepExecution> {
        let job_ids: Vec<Uuid> = self.executions_of(instance_id).map(|e| e.id).collect();
        self.step_executions
            .values()
            .filter(|s| s.step_name == step_name && job_ids.contains(&s.job_execution_id))
            .collect()
    }

    fn with_steps(&self, execution: &JobExecution) -> JobExecution {
        let mut full = execution.clone();
        full.step_executions = self.step_executions
                                   .values()
                                   .filter(|s| s.job_execution_id == execution.id)
                                   .cloned()
                                   .collect();
        full
    }
}

#[derive(Default)]
pub struct InMemoryJobRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, BatchError> {
        self.state.lock().map_err(|_| BatchError::Repository("in-memory repository lock poisoned".into()))
    }

    pub fn job_execution_count(&self) -> usize {
        self.state().map(|s| s.job_executions.len()).unwrap_or(0)
    }
}

fn not_found(entity: &str, id: Uuid) -> BatchError {
    BatchError::Repository(format!("{entity} {id} not found"))
}

impl JobRepository for InMemoryJobRepository {
    type Conn = MemoryTransaction;

    fn create_job_execution(&self,
                            job_name: &str,
                            parameters: &JobParameters,
                            restartable: bool)
                            -> Result<JobExecution, BatchError> {
        let mut state = self.state()?;
        let key = (job_name.to_string(), parameters.job_key());
        let (instance, inherited) = match state.instances.get(&key).cloned() {
            Some(existing) => {
                let previous: Vec<JobExecution> = state.executions_of(existing.id).cloned().collect();
                check_relaunch(job_name, &key.1, &previous, restartable)?;
                (existing, previous.last().map(|e| e.execution_context.clone()))
            }
            None => {
                let instance = JobInstance::new(job_name, parameters);
                state.instances.insert(key, instance.clone());
                (instance, None)
            }
        };
        let mut execution = JobExecution::new(instance, parameters.clone());
        // Un reinicio parte del contexto de job de la última ejecución.
        if let Some(context) = inherited {
            execution.execution_context = context;
        }
        info!("repo:create-job-execution job={} execution={} instance={}",
              job_name, execution.id, execution.instance.id);
        state.job_executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    fn update_job_execution(&self, execution: &mut JobExecution) -> Result<(), BatchError> {
        let mut state = self.state()?;
        let stored = state.job_executions
                          .get_mut(&execution.id)
                          .ok_or_else(|| not_found("job execution", execution.id))?;
        if stored.version != execution.version {
            return Err(stale("job execution", execution.id, execution.version, stored.version));
        }
        let merged = merge_job_status(stored.status, execution.status);
        if merged != execution.status {
            debug!("repo:merge-status execution={} ours={} stored={} merged={}",
                   execution.id, execution.status, stored.status, merged);
            execution.status = merged;
        }
        execution.version += 1;
        execution.last_updated = Utc::now();
        let mut copy = execution.clone();
        copy.step_executions.clear();
        *stored = copy;
        Ok(())
    }

    fn create_step_execution(&self,
                             job_execution: &JobExecution,
                             step_name: &str,
                             context: ExecutionContext)
                             -> Result<StepExecution, BatchError> {
        let mut state = self.state()?;
        if !state.job_executions.contains_key(&job_execution.id) {
            return Err(not_found("job execution", job_execution.id));
        }
        let mut step = StepExecution::new(job_execution.id, step_name);
        step.execution_context = context;
        state.step_executions.insert(step.id, step.clone());
        Ok(step)
    }

    fn update_step_execution(&self, execution: &mut StepExecution) -> Result<(), BatchError> {
        let mut state = self.state()?;
        let stored = state.step_executions
                          .get_mut(&execution.id)
                          .ok_or_else(|| not_found("step execution", execution.id))?;
        if stored.version != execution.version {
            return Err(stale("step execution", execution.id, execution.version, stored.version));
        }
        execution.version += 1;
        execution.last_updated = Utc::now();
        *stored = execution.clone();
        Ok(())
    }

    fn commit_chunk(&self,
                    work: &mut dyn FnMut(&mut Self::Conn) -> Result<StepExecution, BatchError>)
                    -> Result<StepExecution, BatchError> {
        let mut tx = MemoryTransaction::default();
        let mut staged = work(&mut tx)?;
        let mut state = self.state()?;
        let stored = state.step_executions
                          .get_mut(&staged.id)
                          .ok_or_else(|| not_found("step execution", staged.id))?;
        if stored.version != staged.version {
            return Err(stale("step execution", staged.id, staged.version, stored.version));
        }
        staged.version += 1;
        staged.last_updated = Utc::now();
        tx.commit();
        *stored = staged.clone();
        Ok(staged)
    }

    fn get_job_execution(&self, id: Uuid) -> Result<Option<JobExecution>, BatchError> {
        let state = self.state()?;
        Ok(state.job_executions.get(&id).map(|e| state.with_steps(e)))
    }

    fn find_last_job_execution(&self,
                               job_name: &str,
                               parameters: &JobParameters)
                               -> Result<Option<JobExecution>, BatchError> {
        let state = self.state()?;
        let key = (job_name.to_string(), parameters.job_key());
        let Some(instance) = state.instances.get(&key) else {
            return Ok(None);
        };
        Ok(state.executions_of(instance.id).last().map(|e| state.with_steps(e)))
    }

    fn find_latest_job_execution(&self, job_name: &str) -> Result<Option<JobExecution>, BatchError> {
        let state = self.state()?;
        Ok(state.job_executions
                .values()
                .filter(|e| e.instance.job_name == job_name)
                .last()
                .map(|e| state.with_steps(e)))
    }

    fn find_last_step_execution(&self,
                                instance_id: Uuid,
                                step_name: &str)
                                -> Result<Option<StepExecution>, BatchError> {
        let state = self.state()?;
        Ok(state.steps_of(instance_id, step_name).last().map(|s| (*s).clone()))
    }

    fn count_step_executions(&self, instance_id: Uuid, step_name: &str) -> Result<u32, BatchError> {
        let state = self.state()?;
        Ok(state.steps_of(instance_id, step_name).len() as u32)
    }

    fn request_stop(&self, job_execution_id: Uuid) -> Result<bool, BatchError> {
        let mut state = self.state()?;
        let stored = state.job_executions
                          .get_mut(&job_execution_id)
                          .ok_or_else(|| not_found("job execution", job_execution_id))?;
        if !matches!(stored.status, BatchStatus::Starting | BatchStatus::Started) {
            return Ok(stored.status == BatchStatus::Stopping);
        }
        stored.status = BatchStatus::Stopping;
        stored.last_updated = Utc::now();
        info!("repo:request-stop execution={job_execution_id}");
        Ok(true)
    }

    fn is_stop_requested(&self, job_execution_id: Uuid) -> Result<bool, BatchError> {
        let state = self.state()?;
        Ok(state.job_executions
                .get(&job_execution_id)
                .map(|e| e.status == BatchStatus::Stopping)
                .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_launch_of_running_instance_is_rejected() {
        let repo = InMemoryJobRepository::new();
        let params = JobParameters::new().with_string("file", "a.csv");
        let first = repo.create_job_execution("import", &params, true).expect("first");
        let err = repo.create_job_execution("import", &params, true).unwrap_err();
        assert_eq!(err,
                   BatchError::JobExecutionAlreadyRunning { job_name: "import".into(),
                                                            execution_id: first.id });
    }

    #[test]
    fn stale_update_is_rejected() {
        let repo = InMemoryJobRepository::new();
        let mut exec = repo.create_job_execution("j", &JobParameters::new(), true).expect("create");
        let mut other = exec.clone();
        repo.update_job_execution(&mut exec).expect("first update");
        assert!(matches!(repo.update_job_execution(&mut other), Err(BatchError::OptimisticLock { .. })));
    }

    #[test]
    fn failed_commit_leaves_no_trace() {
        let repo = InMemoryJobRepository::new();
        let exec = repo.create_job_execution("j", &JobParameters::new(), true).expect("create");
        let step = repo.create_step_execution(&exec, "s", ExecutionContext::new()).expect("step");
        let applied = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = applied.clone();
        let result = repo.commit_chunk(&mut |tx| {
                             let flag = flag.clone();
                             tx.on_commit(move || flag.store(true, std::sync::atomic::Ordering::SeqCst));
                             Err(BatchError::Repository("boom".into()))
                         });
        assert!(result.is_err());
        assert!(!applied.load(std::sync::atomic::Ordering::SeqCst));
        let stored = repo.find_last_step_execution(exec.instance.id, "s").expect("find").expect("some");
        assert_eq!(stored.version, step.version);
    }

    #[test]
    fn stop_request_is_visible_and_merged() {
        let repo = InMemoryJobRepository::new();
        let mut exec = repo.create_job_execution("j", &JobParameters::new(), true).expect("create");
        exec.mark_started().expect("start");
        repo.update_job_execution(&mut exec).expect("update");
        assert!(repo.request_stop(exec.id).expect("stop"));
        assert!(repo.is_stop_requested(exec.id).expect("query"));
        repo.update_job_execution(&mut exec).expect("update");
        assert_eq!(exec.status, BatchStatus::Stopping);
    }
}
