//! EZ1 Local API Client
//!
//! Thin transport over the inverter's HTTP API. Two operations:
//!
//! - [`InverterClient::probe`] opens and drops a TCP connection to check the
//!   inverter is reachable at all
//! - [`InverterClient::fetch`] issues `GET http://host:port/<path>` and decodes
//!   the JSON envelope
//!
//! Both carry an independent timeout (5 seconds by default). Nothing is
//! retried here; the collector's backoff handles repeated failures.
//!
//! # Example
//!
//! ```no_run
//! use apsystems_ez1_exporter::config::InverterAddress;
//! use apsystems_ez1_exporter::inverter::InverterClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = InverterClient::new(InverterAddress {
//!     host: "192.168.1.20".to_string(),
//!     port: 8050,
//! })?;
//!
//! client.probe().await?;
//! let output = client.fetch("getOutputData").await?;
//! println!("p1 = {:?}", output.data.get("p1"));
//! # Ok(())
//! # }
//! ```

use crate::config::InverterAddress;
use crate::error::{ExporterError, Result};
use crate::inverter::types::EndpointPayload;
use reqwest::Client;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Default timeout for both the probe and each endpoint request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct InverterClient {
    address: InverterAddress,
    client: Client,
    timeout: Duration,
}

impl InverterClient {
    pub fn new(address: InverterAddress) -> Result<Self> {
        Self::with_timeout(address, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(address: InverterAddress, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ExporterError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            address,
            client,
            timeout: request_timeout,
        })
    }

    pub fn address(&self) -> &InverterAddress {
        &self.address
    }

    /// Check the inverter accepts TCP connections on its API port.
    pub async fn probe(&self) -> Result<()> {
        debug!("Check inverter online at {}", self.address);

        let connect = TcpStream::connect((self.address.host.as_str(), self.address.port));
        match timeout(self.timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ExporterError::Transport(format!(
                "unable to connect to {}: {}",
                self.address, e
            ))),
            Err(_) => Err(ExporterError::Transport(format!(
                "connection to {} timed out after {:?}",
                self.address, self.timeout
            ))),
        }
    }

    /// Fetch and decode one endpoint.
    pub async fn fetch(&self, path: &str) -> Result<EndpointPayload> {
        let url = self.url(path);
        debug!("Collect {} from {}", path, self.address);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExporterError::Transport(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExporterError::Transport(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExporterError::Transport(format!("reading {} failed: {}", url, e)))?;

        let payload: EndpointPayload = serde_json::from_str(&body)?;
        if let Some(message) = &payload.message {
            debug!("{} answered with message '{}'", path, message);
        }
        Ok(payload)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "http://{}:{}/{}",
            self.address.host,
            self.address.port,
            path.trim_start_matches('/')
        )
    }
}
