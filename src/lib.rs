//! procwatch agent: periodically captures the process table of a host, rebuilds parent/child
//! relations and delivers the snapshot to a procwatch store.

pub mod app;
pub mod collector;
pub mod config;
pub mod delivery;
pub mod hierarchy;
mod local_logger;
mod prelude;
mod request_client;
pub mod scheduler;
pub mod system;

pub use request_client::USER_AGENT;
