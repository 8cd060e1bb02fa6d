//! Collection Loop
//!
//! One [`Collector`] drives the whole exporter. Each cycle runs strictly in
//! sequence:
//!
//! 1. Publish the exporter version info and probe the inverter port
//! 2. Fetch every schema endpoint in order and publish its `data` fields
//! 3. On full success, clear the health marker
//! 4. Compute the next interval from the failure count, raising the health
//!    marker once degraded
//! 5. If the probe failed, publish `connected = 0` and zero `p1`/`p2`
//!
//! then sleeps for the computed interval.
//!
//! # Error Handling
//!
//! Nothing in a cycle is fatal. A failed probe or a failed endpoint counts as
//! one consecutive failure and is logged; the first failing endpoint aborts the
//! rest of the cycle. Per-field problems are absorbed by the registry.

pub mod health;
pub mod state;

pub use health::HealthMarker;
pub use state::CollectionState;

use crate::config::CollectorConfig;
use crate::inverter::InverterClient;
use crate::metrics::MetricRegistry;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Result of a single collection cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every endpoint was fetched and published
    Collected,
    /// The reachability probe failed; nothing was fetched
    Unreachable,
    /// The probe succeeded but fetching or decoding `endpoint` failed
    FetchFailed { endpoint: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub connected: bool,
    pub next_interval: Duration,
}

pub struct Collector {
    client: InverterClient,
    registry: MetricRegistry,
    state: CollectionState,
    health: HealthMarker,
}

impl Collector {
    pub fn new(
        client: InverterClient,
        registry: MetricRegistry,
        state: CollectionState,
        health: HealthMarker,
    ) -> Self {
        Self {
            client,
            registry,
            state,
            health,
        }
    }

    /// Build a collector from the `[collector]` configuration section.
    pub fn from_config(
        client: InverterClient,
        registry: MetricRegistry,
        config: &CollectorConfig,
    ) -> Self {
        let health = if config.health_file_enabled {
            HealthMarker::new(config.health_file_path.clone())
        } else {
            HealthMarker::disabled()
        };
        let state = CollectionState::new(
            Duration::from_secs(config.collect_interval_seconds),
            config.max_failures_before_degraded,
        );
        Self::new(client, registry, state, health)
    }

    pub fn state(&self) -> &CollectionState {
        &self.state
    }

    pub fn health(&self) -> &HealthMarker {
        &self.health
    }

    /// Run cycles forever, sleeping the backoff interval between them.
    pub async fn run(mut self) {
        loop {
            let report = self.run_cycle().await;
            info!(
                "waiting {}s before next collection cycle",
                report.next_interval.as_secs()
            );
            tokio::time::sleep(report.next_interval).await;
        }
    }

    /// Execute one collection cycle without sleeping.
    pub async fn run_cycle(&mut self) -> CycleReport {
        info!("Start collect cycle");
        self.registry.publish_device_info();

        let outcome = match self.client.probe().await {
            Ok(()) => {
                debug!("Inverter is online");
                self.state.record_success();
                self.registry.set_connected(true);
                self.collect_endpoints().await
            }
            Err(e) => {
                warn!("{}", e);
                self.state.record_failure();
                CycleOutcome::Unreachable
            }
        };

        match &outcome {
            CycleOutcome::Collected => {
                if let Err(e) = self.health.clear() {
                    warn!("Failed to remove health marker: {}", e);
                }
                info!("Data collected and published");
            }
            CycleOutcome::FetchFailed { .. } => self.state.record_failure(),
            CycleOutcome::Unreachable => {}
        }

        let next_interval = self.state.next_interval();
        if self.state.is_degraded() {
            debug!(
                "{} consecutive failures, maybe offline - raising health marker",
                self.state.consecutive_failures()
            );
            if let Err(e) = self.health.raise() {
                warn!("Failed to write health marker: {}", e);
            }
        }

        let connected = outcome != CycleOutcome::Unreachable;
        if !connected {
            self.registry.publish_disconnected();
        }

        CycleReport {
            outcome,
            connected,
            next_interval,
        }
    }

    async fn collect_endpoints(&self) -> CycleOutcome {
        for endpoint in self.registry.schema().endpoints() {
            match self.client.fetch(&endpoint.path).await {
                Ok(payload) => {
                    let published = self.registry.publish_endpoint(endpoint, &payload.data);
                    debug!(
                        "Published {}/{} fields from {}",
                        published,
                        payload.data.len(),
                        endpoint.path
                    );
                }
                Err(e) => {
                    error!("Failed while reading {} from inverter: {}", endpoint.path, e);
                    return CycleOutcome::FetchFailed {
                        endpoint: endpoint.path.clone(),
                    };
                }
            }
        }
        CycleOutcome::Collected
    }
}
