//! Binary entry point for the batch job entrypoint.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::error;

use batch_entrypoint::{
    CommandRunner, ConfigError, EntrypointConfig, EnvProbe, FATAL_EXIT_CODE, JobEnvironment,
    LoggingError, ProcessCommandRunner, RunError, RunOrchestrator, init_logging,
};

mod cli;

use cli::Cli;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Logging(#[from] LoggingError),
    #[error("{0}")]
    Run(#[from] RunError),
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Run(err) => err.exit_code(),
            Self::Config(_) | Self::Logging(_) => FATAL_EXIT_CODE,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match start(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "entrypoint failed");
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

async fn start(cli: Cli) -> Result<i32, CliError> {
    let config = EntrypointConfig::load_without_cli_args()?;
    init_logging(&config.log_level)?;

    let environment = EnvProbe::from_process().job_environment();
    run_job(&config, &environment, &cli.command, ProcessCommandRunner::new()).await
}

async fn run_job<R>(
    config: &EntrypointConfig,
    environment: &JobEnvironment,
    command: &[String],
    runner: R,
) -> Result<i32, CliError>
where
    R: CommandRunner + Clone,
{
    let orchestrator = RunOrchestrator::from_config(config, runner)?;
    Ok(orchestrator.execute(environment, command).await?)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
