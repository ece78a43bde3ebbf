use clap::{CommandFactory, Parser};
use page_harvest::api::credentials::EnvCredentials;
use page_harvest::cli::CliArgs;
use page_harvest::core::controller;
use page_harvest::logging::{log, setup_logging, LogLevel};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::runtime::Builder;

fn main() -> ExitCode {
    let cli_args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            setup_logging(true);
            if e.use_stderr() {
                log(LogLevel::Error, &format!("CLI Argument Error: {}", e));
                let _ = CliArgs::command().print_help();
                return ExitCode::from(2);
            }
            // --help / --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    setup_logging(cli_args.use_color());

    let cfg = match cli_args.to_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            log(LogLevel::Error, &e.to_string());
            return ExitCode::from(2);
        }
    };

    let runtime = match Builder::new_multi_thread()
        .enable_all()
        .thread_name("harvest-worker")
        .worker_threads(num_cpus::get())
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log(
                LogLevel::Error,
                &format!("FATAL: Failed to build Tokio runtime: {}", e),
            );
            return ExitCode::FAILURE;
        }
    };

    let credentials = Arc::new(EnvCredentials::default());
    match runtime.block_on(controller::run(cfg, credentials)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) if e.is_usage_error() => {
            log(LogLevel::Error, &e.to_string());
            ExitCode::from(2)
        }
        Err(e) => {
            log(LogLevel::Error, &format!("FATAL: {}", e));
            ExitCode::FAILURE
        }
    }
}
