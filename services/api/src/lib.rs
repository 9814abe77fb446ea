mod cli;
mod infra;
mod routes;
mod server;
mod svnr;

use std::process::ExitCode;

use payroll_desk::error::AppError;

pub async fn run() -> Result<ExitCode, AppError> {
    cli::run().await
}
