use batchflow::app;
use batchflow::cli::Cli;
use batchflow::config::AppConfig;
use batch_core::ExitCode;
use clap::Parser;
use log::error;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("config:invalid err={e}");
            eprintln!("error: {e}");
            std::process::exit(ExitCode::Configuration.code());
        }
    };
    let code = app::run(cli.command, &config);
    std::process::exit(code.code());
}
