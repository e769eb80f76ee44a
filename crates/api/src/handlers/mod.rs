pub mod delivery_logs;
pub mod executions;
pub mod messages;
pub mod sequences;
