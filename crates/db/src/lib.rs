//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, and repository functions
//! for every table the sequence engine and delivery gateway touch.
//! No business logic lives here.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::{DbPool, PoolSettings};
