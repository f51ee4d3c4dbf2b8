use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use batch_adapters::{hello_job, import_user_job, HelloWorldTasklet, ImportSettings, JobCompletionNotificationListener,
                     PeopleStore, Person, IMPORT_USER_JOB};
use batch_core::{BatchStatus, EventLogListener, EventStore, InMemoryEventStore, InMemoryJobRepository, JobBuilder,
                 JobParameters, MemoryTransaction, StepBuilder};
use tempfile::NamedTempFile;

fn sample_csv(contents: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("tmp");
    f.write_all(contents.as_bytes()).expect("write");
    f
}

fn settings(input: &NamedTempFile) -> ImportSettings {
    ImportSettings { input: input.path().to_path_buf(),
                     ..ImportSettings::default() }
}

#[test]
fn import_user_job_uppercases_five_people_in_one_chunk() {
    let csv = sample_csv("Jill,Doe\nJoe,Doe\nJustin,Doe\nJane,Doe\nJohn,Doe\n");
    let store = PeopleStore::new();
    let job = import_user_job::<MemoryTransaction, _, _>(&settings(&csv), store.clone(), Arc::new(store.clone()), &[])
        .expect("job");
    let repo = InMemoryJobRepository::new();

    let execution = job.run(JobParameters::new().with_long("run.id", 1), &repo).expect("run");

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.job_name(), IMPORT_USER_JOB);
    let step = &execution.step_executions[0];
    assert_eq!(step.step_name, "step1");
    assert_eq!((step.read_count, step.write_count, step.commit_count), (5, 5, 1));
    let expected: Vec<Person> = ["JILL", "JOE", "JUSTIN", "JANE", "JOHN"].iter()
                                                                        .map(|n| Person::new(*n, "DOE"))
                                                                        .collect();
    assert_eq!(store.snapshot(), expected);
}

#[test]
fn malformed_people_are_skipped_within_limit() {
    let csv = sample_csv("Jill,Doe\nbroken\nJoe,Doe\n");
    let store = PeopleStore::new();
    let job = import_user_job::<MemoryTransaction, _, _>(&ImportSettings { skip_limit: 1,
                                                                           ..settings(&csv) },
                                                         store.clone(),
                                                         Arc::new(store.clone()),
                                                         &[]).expect("job");
    let repo = InMemoryJobRepository::new();
    let execution = job.run(JobParameters::new(), &repo).expect("run");
    assert_eq!(execution.status, BatchStatus::Completed);
    let step = &execution.step_executions[0];
    assert_eq!((step.write_count, step.read_skip_count), (2, 1));
    assert_eq!(store.len(), 2);
}

#[test]
fn completion_listener_reports_stored_rows_only_on_success() {
    let csv = sample_csv("Ann,Lee\nBo,Kim\n");
    let store = PeopleStore::new();
    let listener = Arc::new(JobCompletionNotificationListener::new(Arc::new(store.clone())));
    let step = StepBuilder::<MemoryTransaction>::new("step1").chunk::<Person, Person>(1)
                                                              .source(batch_adapters::DelimitedSource::new(csv.path(),
                                                                                                           &["firstName",
                                                                                                             "lastName"]))
                                                              .transformer(batch_adapters::UppercaseTransformer)
                                                              .sink(store.clone())
                                                              .build()
                                                              .expect("step");
    let job = JobBuilder::new("notify").listener(listener.clone()).step(step).build().expect("job");
    let repo = InMemoryJobRepository::new();
    let execution = job.run(JobParameters::new(), &repo).expect("run");
    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.step_executions[0].commit_count, 2);
    assert_eq!(listener.reported(), 2);

    let missing = StepBuilder::<MemoryTransaction>::new("step1").chunk::<Person, Person>(1)
                                                                 .source(batch_adapters::DelimitedSource::new("/no/such.csv",
                                                                                                              &["firstName",
                                                                                                                "lastName"]))
                                                                 .transformer(batch_adapters::UppercaseTransformer)
                                                                 .sink(store.clone())
                                                                 .build()
                                                                 .expect("step");
    let quiet = Arc::new(JobCompletionNotificationListener::new(Arc::new(store.clone())));
    let failing = JobBuilder::new("notify-missing").listener(quiet.clone()).step(missing).build().expect("job");
    let failed = failing.run(JobParameters::new(), &repo).expect("run");
    assert_eq!(failed.status, BatchStatus::Failed);
    assert_eq!(quiet.reported(), 0);
}

#[test]
fn hello_job_runs_tasklet_exactly_once() {
    let tasklet = HelloWorldTasklet::new();
    let invocations = tasklet.invocations();
    let job = JobBuilder::new("hello-once").step(StepBuilder::<MemoryTransaction>::new("step").tasklet(tasklet))
                                           .build()
                                           .expect("job");
    let repo = InMemoryJobRepository::new();
    let events = Arc::new(InMemoryEventStore::new());
    let execution = job.run(JobParameters::new(), &repo).expect("run");
    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(execution.step_executions[0].commit_count, 1);

    let sample = hello_job::<MemoryTransaction>(&[]).expect("job");
    let listener = Arc::new(EventLogListener::new(Arc::clone(&events)));
    let traced = JobBuilder::new("hello-traced").listener(listener)
                                                .step(StepBuilder::<MemoryTransaction>::new("step")
                                                          .tasklet(HelloWorldTasklet::new()))
                                                .build()
                                                .expect("job");
    let run = traced.run(JobParameters::new(), &repo).expect("run");
    let logged = events.list(run.id).expect("list");
    let names: Vec<&str> = logged.iter().map(|e| e.kind.name()).collect();
    assert_eq!(names,
               vec!["JobStarted", "StepStarted", "ChunkCommitted", "StepFinished", "JobFinished"]);
    assert_eq!(sample.step_names(), vec!["step"]);
    assert!(sample.has_incrementer());
}
