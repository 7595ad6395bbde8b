//! Expense reporting and reimbursement workflow.
//!
//! Operators record expenses, bundle them into reports and request advances;
//! finance actors review, approve and settle them. Every status change is
//! written as one versioned update that appends a chained audit entry.

pub mod access;
pub mod advance;
pub mod aggregate;
pub mod audit;
pub mod config;
pub mod error;
pub mod expense;
pub mod notify;
pub mod report;
pub mod repository;
pub mod service;
pub mod session;
pub mod types;
pub mod utils;

pub use error::{Result, ValidationError, WorkflowError};
pub use repository::{Repository, SledRepository};
pub use service::{TransitionRequest, WorkflowService};
pub use session::{Actor, Role, Session};
