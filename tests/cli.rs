use std::io::Write;

use batch_core::{BatchStatus, ExitCode};
use batchflow::app::{self, LaunchOverrides, LaunchRequest};
use batchflow::cli::{Cli, Command};
use batchflow::config::AppConfig;
use clap::Parser;
use uuid::Uuid;

fn memory_config() -> AppConfig {
    AppConfig { database: None,
                ..AppConfig::default() }
}

fn people_csv() -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("tmp");
    f.write_all(b"Jill,Doe\nJoe,Doe\nJustin,Doe\nJane,Doe\nJohn,Doe\n").expect("write");
    f
}

#[test]
fn parses_launch_flags() {
    let cli = Cli::try_parse_from(["batchflow",
                                   "launch",
                                   "importUserJob",
                                   "--param",
                                   "run.id(long)=4",
                                   "-p",
                                   "-note=x",
                                   "--chunk-size",
                                   "2",
                                   "--async",
                                   "--next"]).expect("parse");
    match cli.command {
        Command::Launch { job,
                          params,
                          chunk_size,
                          async_mode,
                          next,
                          .. } => {
            assert_eq!(job, "importUserJob");
            assert_eq!(params, vec!["run.id(long)=4", "-note=x"]);
            assert_eq!(chunk_size, Some(2));
            assert!(async_mode && next);
        }
        other => panic!("unexpected command {other:?}"),
    }
    let id = Uuid::new_v4();
    let stop = Cli::try_parse_from(["batchflow", "stop", &id.to_string()]).expect("parse");
    assert_eq!(stop.command, Command::Stop { execution: id });
    assert!(Cli::try_parse_from(["batchflow", "status", "not-a-uuid"]).is_err());
}

#[test]
fn import_user_job_in_memory() {
    let csv = people_csv();
    let config = memory_config();
    let request = LaunchRequest::resolve("importUserJob".into(),
                                         &[],
                                         &config,
                                         LaunchOverrides { input: Some(csv.path().to_path_buf()),
                                                           ..LaunchOverrides::default() }).expect("request");
    assert!(request.parameters.contains("input.file"));
    let execution = app::launch(&request, &config).expect("launch");
    assert_eq!(execution.status, BatchStatus::Completed);
    let summary = execution.summary();
    assert_eq!((summary.read_count, summary.write_count, summary.commit_count), (5, 5, 1));
}

#[test]
fn async_hello_job_waits_for_completion() {
    let config = memory_config();
    let request = LaunchRequest::resolve("helloJob".into(),
                                         &["-note=async".to_string()],
                                         &config,
                                         LaunchOverrides { async_mode: true,
                                                           next: true,
                                                           ..LaunchOverrides::default() }).expect("request");
    let execution = app::launch(&request, &config).expect("launch");
    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.parameters.get_long("run.id"), Some(1));
}

#[test]
fn exit_codes_for_cli_commands() {
    let config = memory_config();
    let unknown = Command::Launch { job: "nope".into(),
                                    params: vec![],
                                    input: None,
                                    chunk_size: None,
                                    skip_limit: None,
                                    async_mode: false,
                                    next: false };
    assert_eq!(app::run(unknown, &config), ExitCode::Configuration);

    let bad_param = Command::Launch { job: "helloJob".into(),
                                      params: vec!["x(long)=abc".into()],
                                      input: None,
                                      chunk_size: None,
                                      skip_limit: None,
                                      async_mode: false,
                                      next: false };
    assert_eq!(app::run(bad_param, &config), ExitCode::Configuration);

    let hello = Command::Launch { job: "helloJob".into(),
                                  params: vec![],
                                  input: None,
                                  chunk_size: None,
                                  skip_limit: None,
                                  async_mode: false,
                                  next: false };
    assert_eq!(app::run(hello, &config), ExitCode::Completed);

    assert_eq!(app::run(Command::Status { execution: Uuid::new_v4() }, &config),
               ExitCode::Configuration);
    assert_eq!(app::run(Command::Jobs, &config), ExitCode::Completed);
}

#[test]
fn missing_input_fails_the_job() {
    let config = memory_config();
    let request = LaunchRequest::resolve("importUserJob".into(),
                                         &[],
                                         &config,
                                         LaunchOverrides { input: Some("/no/such/people.csv".into()),
                                                           ..LaunchOverrides::default() }).expect("request");
    let result = app::launch(&request, &config);
    let execution = result.as_ref().expect("launch");
    assert_eq!(execution.status, BatchStatus::Failed);
    assert!(!execution.failures.is_empty());
    assert_eq!(batch_core::exit_code_for(&result), ExitCode::Failed);
}
