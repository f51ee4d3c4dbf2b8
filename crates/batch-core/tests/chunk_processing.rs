mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use batch_core::constants::DEFAULT_RETRY_LIMIT;
use batch_core::{BatchError, BatchStatus, FnTransformer, InMemoryJobRepository, IterSource, JobBuilder, JobParameters,
                 PassThrough, SharedVecSink, SourceError, StepBuilder, TransformError, Transformed};
use common::{numbers, FlakySink, Tx};

fn run_passthrough(len: u64, chunk: usize) -> batch_core::JobExecution {
    let repo = InMemoryJobRepository::new();
    let sink = SharedVecSink::new();
    let step = StepBuilder::<Tx>::new("copy").chunk::<u64, u64>(chunk)
                                             .source(IterSource::new(numbers(len)))
                                             .transformer(PassThrough)
                                             .sink(sink.clone())
                                             .build()
                                             .expect("step");
    let job = JobBuilder::new("copy-job").step(step).build().expect("job");
    let exec = job.run(JobParameters::new(), &repo).expect("run");
    assert_eq!(sink.snapshot(), numbers(len));
    exec
}

#[test]
fn commit_count_is_ceil_of_records_over_chunk_size() {
    for (len, chunk) in [(0u64, 3usize), (1, 3), (9, 3), (10, 3), (5, 10)] {
        let exec = run_passthrough(len, chunk);
        assert_eq!(exec.status, BatchStatus::Completed);
        let step = &exec.step_executions[0];
        assert_eq!(step.commit_count, len.div_ceil(chunk as u64), "len={len} chunk={chunk}");
        assert_eq!(step.read_count, len);
        assert_eq!(step.write_count, len);
        assert_eq!(step.rollback_count, 0);
    }
}

#[test]
fn counts_are_conserved_with_filters_and_skips() {
    let repo = InMemoryJobRepository::new();
    let sink = SharedVecSink::new();
    let records = vec![Ok(1u64),
                       Ok(2),
                       Err(SourceError::Malformed { line: 3, reason: "bad".into() }),
                       Ok(4),
                       Ok(7),
                       Err(SourceError::Malformed { line: 6, reason: "bad".into() }),
                       Ok(9),
                       Ok(10)];
    let transformer = FnTransformer::new(|x: u64| {
        if x == 7 {
            Err(TransformError::Rejected("seven".into()))
        } else if x % 2 == 0 {
            Ok(Transformed::Filter)
        } else {
            Ok(Transformed::Keep(x * 10))
        }
    });
    let step = StepBuilder::<Tx>::new("mixed").chunk::<u64, u64>(3)
                                              .source(IterSource::from_results(records))
                                              .transformer(transformer)
                                              .sink(sink.clone())
                                              .skip_limit(5)
                                              .build()
                                              .expect("step");
    let job = JobBuilder::new("mixed-job").step(step).build().expect("job");
    let exec = job.run(JobParameters::new(), &repo).expect("run");

    assert_eq!(exec.status, BatchStatus::Completed);
    let s = &exec.step_executions[0];
    assert_eq!(s.read_count, 6);
    assert_eq!(s.read_skip_count, 2);
    assert_eq!(s.process_skip_count, 1);
    assert_eq!(s.filter_count, 3);
    assert_eq!(s.write_count, 2);
    assert_eq!(s.read_count, s.write_count + s.filter_count + s.process_skip_count);
    // skipped reads consume chunk slots: 8 consumed records in chunks of 3
    assert_eq!(s.commit_count, 3);
    assert_eq!(sink.snapshot(), vec![10, 90]);
}

#[test]
fn exceeding_the_skip_limit_fails_the_step() {
    let repo = InMemoryJobRepository::new();
    let records = vec![Ok(1u64),
                       Err(SourceError::Unreadable("a".into())),
                       Err(SourceError::Unreadable("b".into())),
                       Ok(4)];
    let step = StepBuilder::<Tx>::new("strict").chunk::<u64, u64>(10)
                                               .source(IterSource::from_results(records))
                                               .transformer(PassThrough)
                                               .sink(SharedVecSink::new())
                                               .skip_limit(1)
                                               .build()
                                               .expect("step");
    let job = JobBuilder::new("skip-job").step(step).build().expect("job");
    let exec = job.run(JobParameters::new(), &repo).expect("run");

    assert_eq!(exec.status, BatchStatus::Failed);
    assert_eq!(exec.step_executions[0].status, BatchStatus::Failed);
    assert!(matches!(exec.failures.as_slice(), [BatchError::SkipLimitExceeded { limit: 1, .. }]));
    assert_eq!(exec.step_executions[0].commit_count, 0);
}

#[test]
fn without_skip_policy_the_first_bad_record_fails() {
    let repo = InMemoryJobRepository::new();
    let records = vec![Ok(1u64), Err(SourceError::Malformed { line: 2, reason: "x".into() })];
    let step = StepBuilder::<Tx>::new("plain").chunk::<u64, u64>(5)
                                              .source(IterSource::from_results(records))
                                              .transformer(PassThrough)
                                              .sink(SharedVecSink::new())
                                              .build()
                                              .expect("step");
    let job = JobBuilder::new("plain-job").step(step).build().expect("job");
    let exec = job.run(JobParameters::new(), &repo).expect("run");
    assert_eq!(exec.status, BatchStatus::Failed);
    assert!(matches!(exec.failures.as_slice(), [BatchError::Source(SourceError::Malformed { line: 2, .. })]));
}

#[test]
fn sink_failure_is_retried_and_rolled_back() {
    let repo = InMemoryJobRepository::new();
    let sink = FlakySink::new(vec![1]);
    let (written, calls) = sink.handle();
    let step = StepBuilder::<Tx>::new("retry").chunk::<u64, u64>(4)
                                              .source(IterSource::new(numbers(6)))
                                              .transformer(PassThrough)
                                              .sink(sink)
                                              .retry(3, Duration::from_millis(1))
                                              .build()
                                              .expect("step");
    let job = JobBuilder::new("retry-job").step(step).build().expect("job");
    let exec = job.run(JobParameters::new(), &repo).expect("run");

    assert_eq!(exec.status, BatchStatus::Completed);
    let s = &exec.step_executions[0];
    assert_eq!(s.rollback_count, 1);
    assert_eq!(s.commit_count, 2);
    assert_eq!(s.write_count, 6);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(written.snapshot(), numbers(6));
}

#[test]
fn steps_retry_the_sink_by_default() {
    let repo = InMemoryJobRepository::new();
    let sink = FlakySink::new(vec![1, 2]);
    let (written, calls) = sink.handle();
    let step = StepBuilder::<Tx>::new("defaults").chunk::<u64, u64>(4)
                                                 .source(IterSource::new(numbers(4)))
                                                 .transformer(PassThrough)
                                                 .sink(sink)
                                                 .build()
                                                 .expect("step");
    let job = JobBuilder::new("default-retry-job").step(step).build().expect("job");
    let exec = job.run(JobParameters::new(), &repo).expect("run");

    assert_eq!(exec.status, BatchStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_RETRY_LIMIT as usize);
    assert_eq!(exec.step_executions[0].rollback_count, u64::from(DEFAULT_RETRY_LIMIT) - 1);
    assert_eq!(written.snapshot(), numbers(4));
}

#[test]
fn exhausted_retries_keep_previous_chunks_only() {
    let repo = InMemoryJobRepository::new();
    let sink = FlakySink::new(vec![2, 3]);
    let (written, _) = sink.handle();
    let step = StepBuilder::<Tx>::new("exhaust").chunk::<u64, u64>(3)
                                                .source(IterSource::new(numbers(9)))
                                                .transformer(PassThrough)
                                                .sink(sink)
                                                .retry(2, Duration::ZERO)
                                                .build()
                                                .expect("step");
    let job = JobBuilder::new("exhaust-job").step(step).build().expect("job");
    let exec = job.run(JobParameters::new(), &repo).expect("run");

    assert_eq!(exec.status, BatchStatus::Failed);
    let s = &exec.step_executions[0];
    assert_eq!(s.commit_count, 1);
    assert_eq!(s.write_count, 3);
    assert_eq!(s.read_count, 3);
    assert_eq!(s.rollback_count, 2);
    assert_eq!(written.snapshot(), vec![1, 2, 3]);
    assert!(matches!(exec.failures.as_slice(), [BatchError::RetryExhausted { attempts: 2, .. }]));
}

#[test]
fn transformer_panic_is_an_item_error() {
    let transformer = || {
        FnTransformer::new(|x: u64| {
            if x == 2 {
                panic!("cannot handle two");
            }
            Ok(Transformed::Keep(x))
        })
    };

    let repo = InMemoryJobRepository::new();
    let sink = SharedVecSink::new();
    let tolerant = StepBuilder::<Tx>::new("tolerant").chunk::<u64, u64>(5)
                                                     .source(IterSource::new(numbers(3)))
                                                     .transformer(transformer())
                                                     .sink(sink.clone())
                                                     .skip_limit(1)
                                                     .build()
                                                     .expect("step");
    let job = JobBuilder::new("panic-tolerant").step(tolerant).build().expect("job");
    let exec = job.run(JobParameters::new(), &repo).expect("run");
    assert_eq!(exec.status, BatchStatus::Completed);
    assert_eq!(exec.step_executions[0].process_skip_count, 1);
    assert_eq!(sink.snapshot(), vec![1, 3]);

    let failing = StepBuilder::<Tx>::new("failing").chunk::<u64, u64>(5)
                                                   .source(IterSource::new(numbers(3)))
                                                   .transformer(transformer())
                                                   .sink(SharedVecSink::new())
                                                   .build()
                                                   .expect("step");
    let job = JobBuilder::new("panic-failing").step(failing).build().expect("job");
    let exec = job.run(JobParameters::new(), &repo).expect("run");
    assert_eq!(exec.status, BatchStatus::Failed);
    assert!(matches!(exec.failures.as_slice(), [BatchError::Transform(TransformError::Panicked(msg))] if msg.contains("two")));
}

#[test]
fn fully_filtered_chunk_commits_without_calling_the_sink() {
    let repo = InMemoryJobRepository::new();
    let sink = FlakySink::new(vec![]);
    let (_, calls) = sink.handle();
    let step = StepBuilder::<Tx>::new("filter").chunk::<u64, u64>(2)
                                               .source(IterSource::new(numbers(4)))
                                               .transformer(FnTransformer::new(|x: u64| {
                                                                if x <= 2 {
                                                                    Ok(Transformed::Filter)
                                                                } else {
                                                                    Ok(Transformed::Keep(x))
                                                                }
                                                            }))
                                               .sink(sink)
                                               .build()
                                               .expect("step");
    let job = JobBuilder::new("filter-job").step(step).build().expect("job");
    let exec = job.run(JobParameters::new(), &repo).expect("run");
    let s = &exec.step_executions[0];
    assert_eq!(s.commit_count, 2);
    assert_eq!(s.filter_count, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn builder_rejects_incomplete_steps() {
    let missing_sink = StepBuilder::<Tx>::new("broken").chunk::<u64, u64>(3)
                                                       .source(IterSource::new(numbers(1)))
                                                       .transformer(PassThrough)
                                                       .build();
    assert!(matches!(missing_sink, Err(BatchError::Configuration(_))));
    let zero = StepBuilder::<Tx>::new("zero").chunk::<u64, u64>(0)
                                             .source(IterSource::new(numbers(1)))
                                             .transformer(PassThrough)
                                             .sink(SharedVecSink::new())
                                             .build();
    assert!(matches!(zero, Err(BatchError::Configuration(_))));
}
