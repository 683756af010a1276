//! Payroll module (employees and pay runs).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod employee;
pub mod payroll;

pub use employee::{Employee, EmployeeId, EmployeeInput};
pub use payroll::{
    CreatePayroll, Payroll, PayrollCommand, PayrollEvent, PayrollId, PayrollStatus, PayrollTerms,
    run_for_period,
};
