use std::time::Duration;

use crate::prelude::*;
use reqwest::ClientBuilder;

pub const USER_AGENT: &str = concat!("procwatch-agent/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by every delivery of the agent's lifetime.
///
/// `timeout` applies to each request independently.
pub fn build_request_client(timeout: Duration) -> Result<reqwest::Client> {
    ClientBuilder::new()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build the HTTP client")
}
