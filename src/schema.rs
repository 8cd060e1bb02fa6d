//! Metric Schema
//!
//! Declarative description of every inverter endpoint and the fields it
//! reports. The schema is loaded once at startup and shared read-only by the
//! registry and the collector for the lifetime of the process.
//!
//! # Source Format
//!
//! The schema is a JSON object keyed by endpoint path, each holding a `data`
//! list of field descriptors:
//!
//! ```json
//! {
//!   "getOutputData": {
//!     "data": [
//!       { "name": "p1", "documentation": "Power of channel 1 in W", "type": "POWER" }
//!     ]
//!   }
//! }
//! ```
//!
//! # Field Kinds
//!
//! | kind | raw value | published as |
//! |---|---|---|
//! | [`FieldKind::GaugeScaledTenth`] | integer | raw / 10 |
//! | [`FieldKind::GaugeRaw`] | number | raw |
//! | [`FieldKind::BooleanFromPositive`] | integer | 1 if raw > 0 else 0 |
//! | [`FieldKind::Enum`] | ordinal | active label state |
//! | [`FieldKind::OpaqueInfo`] | anything | info record `{name: value}` |
//!
//! Fields without a `type` (or with one this exporter does not know) are
//! [`FieldKind::OpaqueInfo`], so new vendor fields never break collection.

use crate::error::{ExporterError, FieldMappingWarning, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// Schema for the EZ1 local API, embedded at build time.
pub const BUILTIN_SCHEMA: &str = include_str!("../schema/objectlist.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    GaugeScaledTenth,
    GaugeRaw,
    BooleanFromPositive,
    Enum,
    OpaqueInfo,
}

impl FieldKind {
    /// Map a vendor `type` string onto a field kind.
    ///
    /// Accepts both the vendor names (`TEMPERATURE`, `POWER`, `IO`, ...) and
    /// the canonical kind names (`GAUGE_RAW`, ...).
    pub fn from_type_name(type_name: Option<&str>) -> Self {
        match type_name.map(str::trim) {
            Some("TEMPERATURE" | "ANALOG" | "GAUGE_SCALED_TENTH") => FieldKind::GaugeScaledTenth,
            Some(
                "POWER" | "ENERGY" | "SECONDS" | "TIMESTAMP" | "COUNTER" | "GAUGE" | "GAUGE_RAW",
            ) => FieldKind::GaugeRaw,
            Some("IO" | "BOOLEAN_FROM_POSITIVE") => FieldKind::BooleanFromPositive,
            Some("ENUM") => FieldKind::Enum,
            _ => FieldKind::OpaqueInfo,
        }
    }
}

/// A converted raw value, ready to be written to a metric handle.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample<'a> {
    /// Numeric gauge value
    Gauge(f64),
    /// Active enum label, `None` when the ordinal does not resolve
    State(Option<&'a str>),
    /// Informational value rendered as a label
    Info(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub documentation: String,
    pub kind: FieldKind,
    /// Ordinal-to-label mapping, empty unless `kind` is [`FieldKind::Enum`].
    pub enum_labels: Vec<String>,
}

impl FieldSpec {
    /// Apply the type-to-representation table to a raw vendor value.
    pub fn convert<'a>(
        &'a self,
        raw: &Value,
    ) -> std::result::Result<Sample<'a>, FieldMappingWarning> {
        match self.kind {
            FieldKind::GaugeScaledTenth => self.numeric(raw).map(|v| Sample::Gauge(v / 10.0)),
            FieldKind::GaugeRaw => self.numeric(raw).map(Sample::Gauge),
            FieldKind::BooleanFromPositive => self
                .numeric(raw)
                .map(|v| Sample::Gauge(if v > 0.0 { 1.0 } else { 0.0 })),
            FieldKind::Enum => Ok(Sample::State(self.enum_label(raw))),
            FieldKind::OpaqueInfo => Ok(Sample::Info(info_value(raw))),
        }
    }

    /// Resolve an enum ordinal to its label.
    pub fn enum_label(&self, raw: &Value) -> Option<&str> {
        let ordinal = numeric_value(raw)?;
        if ordinal < 0.0 || ordinal.fract() != 0.0 {
            return None;
        }
        self.enum_labels.get(ordinal as usize).map(String::as_str)
    }

    fn numeric(&self, raw: &Value) -> std::result::Result<f64, FieldMappingWarning> {
        numeric_value(raw).ok_or_else(|| FieldMappingWarning::Unconvertible {
            field: self.name.clone(),
            value: raw.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSpec {
    /// Route segment on the inverter, e.g. `getOutputData`
    pub path: String,
    pub fields: Vec<FieldSpec>,
}

impl EndpointSpec {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Ordered set of endpoints with globally unique field names.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSchema {
    endpoints: Vec<EndpointSpec>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    #[serde(default)]
    data: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: Option<String>,
    documentation: Option<String>,
    #[serde(rename = "type")]
    type_name: Option<String>,
    #[serde(rename = "enum")]
    labels: Option<Vec<String>>,
}

impl MetricSchema {
    /// Parse a schema document.
    ///
    /// Fails when the document is not an object of endpoints, a field has no
    /// name, an enum field has no labels, or a field name appears twice
    /// anywhere in the schema.
    pub fn load(source: &str) -> Result<Self> {
        let document: serde_json::Map<String, Value> = serde_json::from_str(source)
            .map_err(|e| ExporterError::Schema(format!("invalid schema document: {}", e)))?;

        let mut seen = HashSet::new();
        let mut endpoints = Vec::with_capacity(document.len());

        for (path, raw) in document {
            let raw: RawEndpoint = serde_json::from_value(raw).map_err(|e| {
                ExporterError::Schema(format!("invalid endpoint '{}': {}", path, e))
            })?;

            let mut fields = Vec::with_capacity(raw.data.len());
            for (index, field) in raw.data.into_iter().enumerate() {
                let name = match field.name {
                    Some(name) if !name.trim().is_empty() => name,
                    _ => {
                        return Err(ExporterError::Schema(format!(
                            "field #{} of endpoint '{}' has no name",
                            index, path
                        )))
                    }
                };

                if !seen.insert(name.clone()) {
                    return Err(ExporterError::Schema(format!(
                        "duplicate field name '{}' (endpoint '{}')",
                        name, path
                    )));
                }

                let kind = FieldKind::from_type_name(field.type_name.as_deref());
                let enum_labels = field.labels.unwrap_or_default();
                if kind == FieldKind::Enum && enum_labels.is_empty() {
                    return Err(ExporterError::Schema(format!(
                        "enum field '{}' declares no labels",
                        name
                    )));
                }

                fields.push(FieldSpec {
                    documentation: field
                        .documentation
                        .filter(|d| !d.trim().is_empty())
                        .unwrap_or_else(|| name.clone()),
                    enum_labels: if kind == FieldKind::Enum {
                        enum_labels
                    } else {
                        Vec::new()
                    },
                    name,
                    kind,
                });
            }

            endpoints.push(EndpointSpec { path, fields });
        }

        Ok(Self { endpoints })
    }

    /// The schema shipped with the exporter.
    pub fn builtin() -> Result<Self> {
        Self::load(BUILTIN_SCHEMA)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            ExporterError::Schema(format!("cannot read schema '{}': {}", path.display(), e))
        })?;
        Self::load(&source)
    }

    pub fn endpoints(&self) -> &[EndpointSpec] {
        &self.endpoints
    }

    pub fn endpoint(&self, path: &str) -> Option<&EndpointSpec> {
        self.endpoints.iter().find(|e| e.path == path)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.endpoints.iter().flat_map(|e| e.fields.iter())
    }
}

/// Numbers, numeric strings (`"1"`) and booleans are numeric.
fn numeric_value(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn info_value(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
