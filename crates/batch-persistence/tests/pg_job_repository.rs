mod test_support;

use batch_core::{BatchError, BatchStatus, ExecutionContext, ExitStatus, JobParameters, JobRepository};
use batch_persistence::pg::{PgJobRepository, PoolProvider};
use test_support::{unique_job, with_pool};

fn repository() -> Option<PgJobRepository<PoolProvider>> {
    with_pool(|pool| PgJobRepository::new(PoolProvider::new(pool.clone())))
}

#[test]
fn launch_rules_are_enforced_in_postgres() {
    let Some(repo) = repository() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let job = unique_job("pg-launch");
    let params = JobParameters::new().with_string("input", "people.csv");

    let mut first = repo.create_job_execution(&job, &params, true).expect("create");
    assert_eq!(first.status, BatchStatus::Starting);
    assert!(matches!(repo.create_job_execution(&job, &params, true),
                     Err(BatchError::JobExecutionAlreadyRunning { .. })));

    first.mark_started().expect("start");
    repo.update_job_execution(&mut first).expect("update");
    first.finish(BatchStatus::Failed, ExitStatus::failed()).expect("finish");
    repo.update_job_execution(&mut first).expect("update");

    let mut second = repo.create_job_execution(&job, &params, true).expect("restart");
    assert_eq!(second.instance.id, first.instance.id);
    second.mark_started().expect("start");
    repo.update_job_execution(&mut second).expect("update");
    second.finish(BatchStatus::Completed, ExitStatus::completed()).expect("finish");
    repo.update_job_execution(&mut second).expect("update");

    assert!(matches!(repo.create_job_execution(&job, &params, true),
                     Err(BatchError::JobInstanceAlreadyComplete { .. })));
    let last = repo.find_last_job_execution(&job, &params).expect("find").expect("some");
    assert_eq!(last.id, second.id);
    assert_eq!(last.status, BatchStatus::Completed);
    assert_eq!(repo.list_job_executions(&job).expect("list").len(), 2);
}

#[test]
fn stale_versions_and_stop_requests() {
    let Some(repo) = repository() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let job = unique_job("pg-stop");
    let mut exec = repo.create_job_execution(&job, &JobParameters::new(), true).expect("create");
    exec.mark_started().expect("start");
    let mut stale = exec.clone();
    repo.update_job_execution(&mut exec).expect("update");
    assert!(matches!(repo.update_job_execution(&mut stale), Err(BatchError::OptimisticLock { .. })));

    assert!(repo.request_stop(exec.id).expect("stop"));
    assert!(repo.is_stop_requested(exec.id).expect("query"));
    let mut merged = repo.get_job_execution(exec.id).expect("get").expect("some");
    assert_eq!(merged.status, BatchStatus::Stopping);
    merged.status = BatchStatus::Completed;
    repo.update_job_execution(&mut merged).expect("merge");
    assert_eq!(merged.status, BatchStatus::Stopped);
}

#[test]
fn step_executions_and_failed_commit() {
    let Some(repo) = repository() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let job = unique_job("pg-step");
    let exec = repo.create_job_execution(&job, &JobParameters::new(), true).expect("create");
    let mut ctx = ExecutionContext::new();
    ctx.put("source.offset", 4u64);
    let mut step = repo.create_step_execution(&exec, "load", ctx).expect("step");
    step.mark_started().expect("start");
    repo.update_step_execution(&mut step).expect("update");
    assert_eq!(step.version, 1);

    let committed = repo.commit_chunk(&mut |_conn| {
                            let mut staged = step.clone();
                            staged.read_count = 3;
                            staged.write_count = 3;
                            staged.commit_count = 1;
                            Ok(staged)
                        })
                        .expect("commit");
    assert_eq!(committed.version, 2);

    let failed = repo.commit_chunk(&mut |_conn| Err(BatchError::Repository("boom".into())));
    assert!(failed.is_err());
    let stored = repo.find_last_step_execution(exec.instance.id, "load").expect("find").expect("some");
    assert_eq!(stored.version, 2);
    assert_eq!(stored.write_count, 3);
    assert_eq!(stored.execution_context.get_u64("source.offset"), Some(4));
    assert_eq!(repo.count_step_executions(exec.instance.id, "load").expect("count"), 1);

    let full = repo.get_job_execution(exec.id).expect("get").expect("some");
    assert_eq!(full.step_executions.len(), 1);
}

#[test]
fn restart_inherits_the_last_job_context() {
    let Some(repo) = repository() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let job = unique_job("pg-context");
    let params = JobParameters::new().with_string("input", "rows.csv");
    let mut first = repo.create_job_execution(&job, &params, true).expect("create");
    assert!(first.execution_context.is_empty());
    first.mark_started().expect("start");
    first.execution_context.put("rows", 42u64);
    repo.update_job_execution(&mut first).expect("update");
    first.finish(BatchStatus::Failed, ExitStatus::failed()).expect("finish");
    repo.update_job_execution(&mut first).expect("update");

    let restart = repo.create_job_execution(&job, &params, true).expect("restart");
    assert_eq!(restart.instance.id, first.instance.id);
    assert_eq!(restart.execution_context.get_u64("rows"), Some(42));
    let stored = repo.get_job_execution(restart.id).expect("get").expect("some");
    assert_eq!(stored.execution_context.get_u64("rows"), Some(42));
}
