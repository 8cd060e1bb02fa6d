//! APsystems EZ1 Prometheus Exporter
//!
//! A Prometheus metrics exporter for APsystems EZ1 micro-inverters.
//!
//! # Overview
//!
//! The exporter polls the inverter's local HTTP API on a fixed interval,
//! converts the vendor JSON telemetry into typed metrics according to a
//! declarative schema, and serves them in Prometheus format. Repeated
//! failures stretch the polling interval and raise a health marker file for
//! external liveness checks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    HTTP / JSON     ┌────────────────┐
//! │  EZ1        │ ◄────────────────► │   Exporter     │
//! │  inverter   │   :8050/<path>     │                │
//! └─────────────┘                    │  ┌──────────┐  │      HTTP      ┌────────────┐
//!                                    │  │Collector │  │ ◄────────────► │ Prometheus │
//!                                    │  └──────────┘  │   /metrics     └────────────┘
//!                                    │  ┌──────────┐  │
//!                                    │  │ Registry │  │
//!                                    │  └──────────┘  │
//!                                    └────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`schema`] - Field/endpoint schema and value conversion table
//! - [`metrics`] - Prometheus registry built from the schema
//! - [`collector`] - Collection cycle, backoff and health marker
//! - [`inverter`] - HTTP client for the EZ1 local API
//! - [`server`] - HTTP server and startup wiring
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use apsystems_ez1_exporter::config::{Config, InverterAddress};
//! use apsystems_ez1_exporter::server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/apsystemsez1/config.ini")?;
//!     let address = InverterAddress { host: "192.168.1.20".to_string(), port: 8050 };
//!     server::start(config, address).await?;
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod inverter;
pub mod metrics;
pub mod schema;
pub mod server;
