//! Employee records kept for client companies.
//!
//! Saving a record is where a raw SVNR typed by office staff enters the
//! system: it is validated, normalized and checked against every other stored
//! employee before it is written.

mod directory;
mod service;


pub use directory::{DirectoryError, EmployeeDirectory, EmployeeDraft, EmployeeId, EmployeeRecord};
pub use service::{EmployeeError, EmployeeRegistry};
