//! Back-office core for an Austrian payroll and bookkeeping office: SVNR
//! validation, client registration approvals and employee record checks.

pub mod config;
pub mod error;
pub mod svnr;
pub mod telemetry;
pub mod workflows;
