use std::process::ExitCode;

use crate::server;
use crate::svnr::{run_audit, run_check, AuditArgs, CheckArgs};
use clap::{Args, Parser, Subcommand};
use payroll_desk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Payroll Desk",
    about = "Run the payroll office registration service and SVNR tooling",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Validate Austrian social insurance numbers
    Svnr {
        #[command(subcommand)]
        command: SvnrCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SvnrCommand {
    /// Validate one or more numbers given on the command line
    Check(CheckArgs),
    /// Validate the SVNR column of an employee CSV export
    Audit(AuditArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<ExitCode, AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await.map(|()| ExitCode::SUCCESS),
        Command::Svnr {
            command: SvnrCommand::Check(args),
        } => Ok(run_check(args)),
        Command::Svnr {
            command: SvnrCommand::Audit(args),
        } => run_audit(args),
    }
}
