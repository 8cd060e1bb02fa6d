//! Prometheus Metrics Registry
//!
//! Builds one Prometheus metric per schema field and converts raw vendor
//! values into metric writes.
//!
//! # Metric Shapes
//!
//! - **Gauge**: scaled, raw and boolean fields (`apsystems_ez1_p1 150`)
//! - **Enum state**: `IntGaugeVec` labelled with the field name, one series per
//!   declared state, the active one set to 1 (`apsystems_ez1_status{status="on"} 1`)
//! - **Info**: `IntGaugeVec` carrying the value as a label
//!   (`apsystems_ez1_ipAddr_info{ipAddr="192.168.1.20"} 1`)
//!
//! Two metrics are always present regardless of the schema:
//! `apsystems_ez1_version_info` and `apsystems_ez1_connected`.
//!
//! All metrics use the `apsystems_ez1_` namespace prefix.

use crate::error::{ExporterError, FieldMappingWarning, Result};
use crate::schema::{EndpointSpec, FieldKind, FieldSpec, MetricSchema, Sample};
use prometheus::{Encoder, Gauge, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

pub const NAMESPACE: &str = "apsystems_ez1";

/// State published for an enum ordinal that has no label.
pub const UNKNOWN_STATE: &str = "unknown";

/// Fields zeroed while the inverter is unreachable.
pub const POWER_OUTPUT_FIELDS: [&str; 2] = ["p1", "p2"];

/// Per-field sink reference.
#[derive(Clone)]
enum MetricHandle {
    Gauge(Gauge),
    State {
        vec: IntGaugeVec,
        labels: Vec<String>,
    },
    Info {
        vec: IntGaugeVec,
        current: Arc<Mutex<Option<String>>>,
    },
}

/// What happened to a single field write.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    Published,
    Skipped(FieldMappingWarning),
}

/// Registry of every exported metric.
#[derive(Clone)]
pub struct MetricRegistry {
    registry: Arc<Registry>,
    schema: Arc<MetricSchema>,
    handles: Arc<HashMap<String, MetricHandle>>,

    pub version_info: Arc<IntGaugeVec>,
    pub connected: Arc<IntGauge>,
}

impl MetricRegistry {
    /// Register one metric per schema field plus the fixed exporter metrics.
    ///
    /// A name the Prometheus registry rejects (invalid or already registered)
    /// is a [`ExporterError::Schema`].
    pub fn build(schema: MetricSchema) -> Result<Self> {
        let registry = Registry::new();

        let version_info = IntGaugeVec::new(
            Opts::new("version_info", "Project version info").namespace(NAMESPACE),
            &["project_version"],
        )
        .map_err(|e| registration_error("version_info", e))?;

        let connected = IntGauge::with_opts(
            Opts::new("connected", "Whether the EZ1 is reachable (1=connected, 0=offline)")
                .namespace(NAMESPACE),
        )
        .map_err(|e| registration_error("connected", e))?;

        registry
            .register(Box::new(version_info.clone()))
            .map_err(|e| registration_error("version_info", e))?;
        registry
            .register(Box::new(connected.clone()))
            .map_err(|e| registration_error("connected", e))?;

        let mut handles = HashMap::new();
        for field in schema.fields() {
            let handle = create_handle(&registry, field)?;
            handles.insert(field.name.clone(), handle);
        }

        debug!("Registered {} schema metrics", handles.len());

        Ok(Self {
            registry: Arc::new(registry),
            schema: Arc::new(schema),
            handles: Arc::new(handles),
            version_info: Arc::new(version_info),
            connected: Arc::new(connected),
        })
    }

    pub fn schema(&self) -> &MetricSchema {
        &self.schema
    }

    /// Convert and write one field of `endpoint`.
    ///
    /// Unknown fields and unconvertible values are logged and skipped; this
    /// never fails.
    pub fn publish(
        &self,
        endpoint: &EndpointSpec,
        field_name: &str,
        raw: &Value,
    ) -> PublishOutcome {
        let Some(field) = endpoint.field(field_name) else {
            return skipped(FieldMappingWarning::UnknownField {
                endpoint: endpoint.path.clone(),
                field: field_name.to_string(),
            });
        };

        let Some(handle) = self.handles.get(&field.name) else {
            return skipped(FieldMappingWarning::UnknownField {
                endpoint: endpoint.path.clone(),
                field: field_name.to_string(),
            });
        };

        let sample = match field.convert(raw) {
            Ok(sample) => sample,
            Err(w) => return skipped(w),
        };

        match (handle, sample) {
            (MetricHandle::Gauge(gauge), Sample::Gauge(value)) => gauge.set(value),
            (MetricHandle::State { vec, labels }, Sample::State(active)) => {
                if active.is_none() {
                    warn!(
                        "Field '{}' has unknown enum ordinal {}, publishing '{}'",
                        field.name, raw, UNKNOWN_STATE
                    );
                }
                set_state(vec, labels, active.unwrap_or(UNKNOWN_STATE));
            }
            (MetricHandle::Info { vec, current }, Sample::Info(value)) => {
                set_info(vec, current, value);
            }
            _ => {
                return skipped(FieldMappingWarning::Unconvertible {
                    field: field.name.clone(),
                    value: raw.to_string(),
                })
            }
        }

        PublishOutcome::Published
    }

    /// Publish every key of an endpoint's `data` object. Returns how many
    /// fields were written.
    pub fn publish_endpoint(&self, endpoint: &EndpointSpec, data: &Map<String, Value>) -> usize {
        debug!("Read values for {}", endpoint.path);
        data.iter()
            .filter(|(name, raw)| self.publish(endpoint, name, raw) == PublishOutcome::Published)
            .count()
    }

    /// Constant presence metric labelled with the exporter version.
    pub fn publish_device_info(&self) {
        debug!("Collect info metrics");
        self.version_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(if connected { 1 } else { 0 });
    }

    /// Mark the inverter offline and zero the power outputs so no stale
    /// readings are scraped.
    pub fn publish_disconnected(&self) {
        self.set_connected(false);
        for name in POWER_OUTPUT_FIELDS {
            match self.handles.get(name) {
                Some(MetricHandle::Gauge(gauge)) => gauge.set(0.0),
                _ => debug!("No power gauge named '{}' to reset", name),
            }
        }
    }

    /// Current value of a numeric field gauge.
    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        match self.handles.get(name) {
            Some(MetricHandle::Gauge(gauge)) => Some(gauge.get()),
            _ => None,
        }
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn create_handle(registry: &Registry, field: &FieldSpec) -> Result<MetricHandle> {
    let name = field.name.as_str();
    let handle = match field.kind {
        FieldKind::GaugeScaledTenth | FieldKind::GaugeRaw | FieldKind::BooleanFromPositive => {
            let gauge = Gauge::with_opts(
                Opts::new(name, field.documentation.as_str()).namespace(NAMESPACE),
            )
            .map_err(|e| registration_error(name, e))?;
            registry
                .register(Box::new(gauge.clone()))
                .map_err(|e| registration_error(name, e))?;
            MetricHandle::Gauge(gauge)
        }
        FieldKind::Enum => {
            let vec = IntGaugeVec::new(
                Opts::new(name, field.documentation.as_str()).namespace(NAMESPACE),
                &[name],
            )
            .map_err(|e| registration_error(name, e))?;
            registry
                .register(Box::new(vec.clone()))
                .map_err(|e| registration_error(name, e))?;
            let labels = field.enum_labels.clone();
            for label in &labels {
                vec.with_label_values(&[label.as_str()]).set(0);
            }
            MetricHandle::State { vec, labels }
        }
        FieldKind::OpaqueInfo => {
            let info_name = format!("{}_info", name);
            let vec = IntGaugeVec::new(
                Opts::new(info_name.as_str(), field.documentation.as_str()).namespace(NAMESPACE),
                &[name],
            )
            .map_err(|e| registration_error(&info_name, e))?;
            registry
                .register(Box::new(vec.clone()))
                .map_err(|e| registration_error(&info_name, e))?;
            MetricHandle::Info {
                vec,
                current: Arc::new(Mutex::new(None)),
            }
        }
    };
    Ok(handle)
}

/// Activate one state; every declared state stays exported with 0.
///
/// The new state is set before the old one is cleared, so a concurrent
/// scrape never sees the metric without an active series.
fn set_state(vec: &IntGaugeVec, labels: &[String], active: &str) {
    vec.with_label_values(&[active]).set(1);
    for label in labels.iter().filter(|l| *l != active) {
        vec.with_label_values(&[label.as_str()]).set(0);
    }
    if active != UNKNOWN_STATE && !labels.iter().any(|l| l == UNKNOWN_STATE) {
        // Absent unless a previous ordinal did not resolve
        let _ = vec.remove_label_values(&[UNKNOWN_STATE]);
    }
}

/// Export `value` as the only series, dropping the previous one afterwards.
fn set_info(vec: &IntGaugeVec, current: &Mutex<Option<String>>, value: String) {
    let mut current = current.lock().unwrap_or_else(PoisonError::into_inner);
    vec.with_label_values(&[value.as_str()]).set(1);
    if let Some(previous) = current.as_deref().filter(|p| *p != value) {
        let _ = vec.remove_label_values(&[previous]);
    }
    *current = Some(value);
}

fn skipped(warning: FieldMappingWarning) -> PublishOutcome {
    warn!("Value not published: {}", warning);
    PublishOutcome::Skipped(warning)
}

fn registration_error(name: &str, e: prometheus::Error) -> ExporterError {
    ExporterError::Schema(format!("cannot register metric '{}': {}", name, e))
}
