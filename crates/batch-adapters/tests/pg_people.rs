use std::io::Write;
use std::sync::Arc;

use batch_adapters::{import_user_job, ImportSettings, PeopleDirectory, Person, PgPagingSource, PgPeopleDirectory,
                     PgPeopleSink};
use batch_core::{BatchStatus, ExecutionContext, ItemSource, JobLauncher, JobParameters, LaunchMode};
use batch_persistence::config::DbConfig;
use batch_persistence::pg::{build_pool, PgJobRepository, PoolProvider};
use diesel::pg::PgConnection;

fn provider() -> Option<PoolProvider> {
    let cfg = DbConfig::from_env_optional().ok().flatten()?;
    build_pool(&cfg.url, 2, 4).ok().map(PoolProvider::new)
}

#[test]
fn import_user_job_writes_people_table() {
    let Some(provider) = provider() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let provider = Arc::new(provider);
    let directory = Arc::new(PgPeopleDirectory::new(Arc::clone(&provider)));
    let before = directory.all().expect("all").len();

    let tag = format!("Doe{}", std::process::id());
    let mut csv = tempfile::NamedTempFile::new().expect("tmp");
    for name in ["Jill", "Joe", "Justin", "Jane", "John"] {
        writeln!(csv, "{name},{tag}").expect("write");
    }
    let settings = ImportSettings { input: csv.path().to_path_buf(),
                                    ..ImportSettings::default() };
    let job = Arc::new(import_user_job::<PgConnection, _, _>(&settings, PgPeopleSink, Arc::clone(&directory), &[]).expect("job"));
    let repo = Arc::new(PgJobRepository::new(provider.as_ref().clone()));
    let launcher = JobLauncher::new(repo, LaunchMode::Sync);

    let execution = launcher.run_next(job, JobParameters::new()).expect("run");
    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.step_executions[0].write_count, 5);

    let all = directory.all().expect("all");
    assert_eq!(all.len(), before + 5);
    let upper = tag.to_uppercase();
    let ours: Vec<&Person> = all.iter().filter(|p| p.last_name == upper).collect();
    assert_eq!(ours.iter().map(|p| p.first_name.as_str()).collect::<Vec<_>>(),
               vec!["JILL", "JOE", "JUSTIN", "JANE", "JOHN"]);
}

#[test]
fn paging_source_reads_pages_and_resumes() {
    let Some(provider) = provider() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let query = "SELECT first_name, last_name FROM (VALUES ('a','x'),('b','x'),('c','x'),('d','x'),('e','x')) \
                 AS t(first_name, last_name) ORDER BY first_name";
    let mut source: PgPagingSource<Person, _> = PgPagingSource::new(provider.clone(), query, 2);
    source.open(&ExecutionContext::new()).expect("open");
    let mut names = Vec::new();
    for _ in 0..3 {
        names.push(source.next().expect("next").expect("row").first_name);
    }
    let mut ctx = ExecutionContext::new();
    source.update(&mut ctx);
    assert_eq!(names, vec!["a", "b", "c"]);

    let mut resumed: PgPagingSource<Person, _> = PgPagingSource::new(provider, query, 2);
    resumed.open(&ctx).expect("open");
    let mut rest = Vec::new();
    while let Some(p) = resumed.next().expect("next") {
        rest.push(p.first_name);
    }
    assert_eq!(rest, vec!["d", "e"]);
}
