//! Delivery of snapshots to the store, with a bounded number of attempts.

use std::time::Duration;

use procwatch_shared::{ErrorBody, IngestReceipt, SnapshotPayload};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

use crate::config::BackendConfig;
use crate::prelude::*;
use crate::request_client::build_request_client;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {reason}")]
    Rejected { status: StatusCode, reason: String },
    #[error("failed to deliver snapshot after {attempts} attempts, last error: {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: Box<DeliveryError>,
    },
}

/// Outcome of a successful delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub attempts: u32,
    pub status: StatusCode,
    /// Body of the store's answer, when it could be decoded. Informational only.
    pub receipt: Option<IngestReceipt>,
}

pub struct DeliveryClient {
    client: reqwest::Client,
    url: Url,
    max_attempts: u32,
    retry_delay: Duration,
}

impl DeliveryClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .with_context(|| format!("Invalid backend url: {}", config.url))?;
        Ok(Self {
            client: build_request_client(config.request_timeout())?,
            url,
            max_attempts: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Send `payload`, retrying with a fixed delay.
    ///
    /// Any transport error or non-2xx answer is a failed attempt. There is no delay after the last
    /// attempt.
    pub async fn deliver(
        &self,
        payload: &SnapshotPayload,
    ) -> std::result::Result<Delivered, DeliveryError> {
        let mut attempt = 1;
        loop {
            info!(
                "Sending snapshot to backend (attempt {attempt}/{})",
                self.max_attempts
            );
            match self.send(payload).await {
                Ok((status, receipt)) => {
                    match &receipt {
                        Some(receipt) => info!("Snapshot delivered: {}", receipt.message),
                        None => info!("Snapshot delivered ({status})"),
                    }
                    return Ok(Delivered {
                        attempts: attempt,
                        status,
                        receipt,
                    });
                }
                Err(err) => {
                    warn!("Delivery attempt {attempt} failed: {err}");
                    if attempt >= self.max_attempts {
                        error!("Failed to send snapshot to backend after all retry attempts");
                        return Err(DeliveryError::Exhausted {
                            attempts: attempt,
                            last_error: Box::new(err),
                        });
                    }
                }
            }

            info!(
                "Waiting {} seconds before retry...",
                self.retry_delay.as_secs_f64()
            );
            sleep(self.retry_delay).await;
            attempt += 1;
        }
    }

    async fn send(
        &self,
        payload: &SnapshotPayload,
    ) -> std::result::Result<(StatusCode, Option<IngestReceipt>), DeliveryError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let mut reason = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            if status == StatusCode::UNAUTHORIZED {
                reason.push_str(" (check that backend.api-key matches the store)");
            }
            return Err(DeliveryError::Rejected { status, reason });
        }

        let receipt = serde_json::from_str::<IngestReceipt>(&text)
            .inspect_err(|err| debug!("Unexpected response body from backend: {err}"))
            .ok();
        Ok((status, receipt))
    }
}
