pub mod employees;
pub mod registration;
