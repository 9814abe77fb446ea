use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use payroll_desk::error::AppError;
use payroll_desk::svnr::{self, audit_reader, AuditReport, ValidationResult};

/// Exit status when at least one number failed validation.
const FINDINGS: u8 = 2;

#[derive(Args, Debug)]
pub(crate) struct CheckArgs {
    /// Numbers to validate; spaces, dashes and other separators are ignored
    #[arg(required = true)]
    pub(crate) numbers: Vec<String>,
    /// Print JSON instead of one line per number
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct AuditArgs {
    /// CSV export with an `svnr` column and an optional `name` column
    pub(crate) path: PathBuf,
    /// Print the full report as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_check(args: CheckArgs) -> ExitCode {
    let results: Vec<ValidationResult> = args
        .numbers
        .iter()
        .map(|number| svnr::validate(number))
        .collect();

    if args.json {
        match serde_json::to_string_pretty(&results) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("validation results unavailable: {err}"),
        }
    } else {
        for (raw, result) in args.numbers.iter().zip(&results) {
            println!("{}", check_line(raw, result));
        }
    }

    exit_code(results.iter().all(|result| result.valid))
}

pub(crate) fn run_audit(args: AuditArgs) -> Result<ExitCode, AppError> {
    let file = File::open(&args.path)?;
    let report = audit_reader(BufReader::new(file))?;

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("audit report unavailable: {err}"),
        }
    } else {
        for line in audit_lines(&report) {
            println!("{line}");
        }
    }

    Ok(exit_code(report.is_clean()))
}

fn exit_code(clean: bool) -> ExitCode {
    if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(FINDINGS)
    }
}

fn check_line(raw: &str, result: &ValidationResult) -> String {
    let display = svnr::format_display(&result.normalized);
    match &result.reason {
        None => format!("valid    {display}"),
        Some(reason) => format!("invalid  {raw:?}: {reason}"),
    }
}

fn audit_lines(report: &AuditReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} of {} numbers valid",
        report.valid_count(),
        report.total()
    )];
    for row in report.invalid() {
        let name = row.name.as_deref().unwrap_or("(no name)");
        let reason = row
            .reason
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        lines.push(format!("  line {:>4}  {name}  {}  {reason}", row.line, row.display));
    }
    lines
}
