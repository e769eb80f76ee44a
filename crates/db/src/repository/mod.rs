//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain types; pure SQL.

pub mod customers;
pub mod delivery_attempts;
pub mod executions;
pub mod jobs;
pub mod sequences;
