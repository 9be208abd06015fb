use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use procwatch_shared::SnapshotPayload;
use tokio::time::{Instant, sleep};

use crate::collector::{CollectionSummary, ProcessEnumerator, ProcessTable};
use crate::config::AgentConfig;
use crate::delivery::{Delivered, DeliveryClient};
use crate::hierarchy::build_hierarchy;
use crate::prelude::*;
use crate::system::SystemInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Collecting,
    Delivering,
    Sleeping,
    ShuttingDown,
    Stopped,
}

/// What a successful cycle did
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub collection: CollectionSummary,
    /// Records in the payload, the root set when hierarchy mode is on
    pub transmitted: usize,
    pub delivered: Delivered,
}

/// Drives collection cycles: enumerate, build the hierarchy, deliver.
///
/// Cycles never overlap. The delivery client, and its connection pool, lives as long as the
/// agent runs and is released on shutdown.
pub struct Agent<T> {
    config: AgentConfig,
    hostname: String,
    enumerator: ProcessEnumerator<T>,
    delivery: Option<DeliveryClient>,
    state: AgentState,
}

impl<T: ProcessTable> Agent<T> {
    pub fn new(config: AgentConfig, hostname: String, table: T) -> Result<Self> {
        let delivery = DeliveryClient::new(&config.backend)?;
        let enumerator = ProcessEnumerator::new(table, config.collection.clone());
        Ok(Self {
            config,
            hostname,
            enumerator,
            delivery: Some(delivery),
            state: AgentState::Idle,
        })
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    fn transition(&mut self, next: AgentState) {
        if self.state != next {
            debug!("Agent state: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Run one collection cycle.
    ///
    /// Fails when the process table cannot be read, when nothing was collected, or when every
    /// delivery attempt failed.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        info!("Starting process data collection...");
        self.transition(AgentState::Collecting);
        let (records, collection) = self.enumerator.collect()?;
        if records.is_empty() {
            bail!("No processes collected");
        }

        let include_hierarchy = self.config.collection.include_hierarchy;
        let records = build_hierarchy(records, include_hierarchy);
        if include_hierarchy {
            info!("After hierarchy building: {} processes remain", records.len());
        } else {
            info!(
                "Process hierarchy disabled, keeping all {} processes",
                records.len()
            );
        }
        let transmitted = records.len();

        self.transition(AgentState::Delivering);
        let payload = SnapshotPayload::new(
            self.hostname.as_str(),
            Utc::now(),
            records,
            self.config.backend.api_key.as_str(),
        );
        let delivery = self
            .delivery
            .as_ref()
            .ok_or(anyhow!("The agent has been shut down"))?;
        let delivered = delivery.deliver(&payload).await?;

        Ok(CycleReport {
            collection,
            transmitted,
            delivered,
        })
    }

    /// Single-shot mode: one cycle, then shut down. Returns whether the cycle succeeded.
    pub async fn run_once(&mut self) -> bool {
        let success = match self.run_cycle().await {
            Ok(_) => {
                info!("Collection cycle completed successfully");
                true
            }
            Err(err) => {
                error!("Collection cycle failed: {err:#}");
                false
            }
        };
        self.display_system_info();
        self.shutdown();
        success
    }

    /// Run cycles every `interval` until `shutdown` resolves.
    ///
    /// The interval includes the cycle itself: the sleep is what remains of it, if anything.
    /// `shutdown` is honored immediately, including during a delivery retry delay.
    pub async fn run_continuous<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let interval = self.config.collection.interval();
        info!(
            "Starting continuous monitoring with {}s intervals",
            interval.as_secs()
        );
        tokio::pin!(shutdown);

        loop {
            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                outcome = self.run_cycle() => Some(outcome),
            };
            match outcome {
                None => break,
                Some(Ok(report)) => info!(
                    "Collection cycle completed successfully ({} processes sent)",
                    report.transmitted
                ),
                Some(Err(err)) => error!("Collection cycle failed: {err:#}"),
            }
            self.display_system_info();

            let remaining = interval.saturating_sub(started.elapsed());
            self.transition(AgentState::Sleeping);
            if remaining > Duration::ZERO {
                info!("Sleeping for {:.1} seconds...", remaining.as_secs_f64());
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = sleep(remaining) => {}
                }
            }
            self.transition(AgentState::Idle);
        }

        info!("Received interrupt signal, shutting down...");
        self.shutdown();
    }

    /// Log a fresh host summary after a cycle when `display-system-info` is on
    fn display_system_info(&self) -> Option<SystemInfo> {
        if !self.config.display_system_info {
            return None;
        }
        match SystemInfo::new(&self.hostname) {
            Ok(system_info) => {
                system_info.display();
                Some(system_info)
            }
            Err(err) => {
                warn!("Could not read system information: {err}");
                None
            }
        }
    }

    fn shutdown(&mut self) {
        self.transition(AgentState::ShuttingDown);
        info!("Cleaning up...");
        drop(self.delivery.take());
        self.transition(AgentState::Stopped);
        info!("Agent shutdown complete");
    }
}
