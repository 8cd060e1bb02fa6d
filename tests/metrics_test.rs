//! Metric registry tests
//!
//! Tests for registry construction, type-directed publishing and rendering.

use apsystems_ez1_exporter::error::{ExporterError, FieldMappingWarning};
use apsystems_ez1_exporter::metrics::{MetricRegistry, PublishOutcome};
use apsystems_ez1_exporter::schema::{EndpointSpec, MetricSchema};
use serde_json::json;

const TEST_SCHEMA: &str = r#"{
    "getOutputData": {
        "data": [
            { "name": "p1", "documentation": "Power channel 1", "type": "POWER" },
            { "name": "p2", "documentation": "Power channel 2", "type": "POWER" },
            { "name": "temp", "documentation": "Temperature", "type": "TEMPERATURE" }
        ]
    },
    "getAlarm": {
        "data": [
            { "name": "og", "documentation": "Off grid", "type": "IO" }
        ]
    },
    "getOnOff": {
        "data": [
            { "name": "status", "documentation": "Power state", "type": "ENUM", "enum": ["off", "on", "fault"] }
        ]
    },
    "getDeviceInfo": {
        "data": [
            { "name": "ipAddr", "documentation": "IP address", "type": "IP" },
            { "name": "devVer" }
        ]
    }
}"#;

/// Helper to create a test registry
fn create_test_registry() -> MetricRegistry {
    let schema = MetricSchema::load(TEST_SCHEMA).expect("Failed to load schema");
    MetricRegistry::build(schema).expect("Failed to build registry")
}

fn endpoint<'a>(registry: &'a MetricRegistry, path: &str) -> &'a EndpointSpec {
    registry.schema().endpoint(path).expect("endpoint exists")
}

#[test]
fn test_registry_exposes_fixed_metrics() {
    // Given: A fresh registry
    let registry = create_test_registry();
    registry.publish_device_info();

    // When: Rendering metrics to Prometheus format
    let rendered = registry.render().expect("Failed to render metrics");

    // Then: Version info and connected are present
    assert!(rendered.contains("# HELP"), "Missing HELP comment");
    assert!(rendered.contains("# TYPE"), "Missing TYPE comment");
    assert!(rendered.contains(&format!(
        "apsystems_ez1_version_info{{project_version=\"{}\"}} 1",
        env!("CARGO_PKG_VERSION")
    )));
    assert!(rendered.contains("apsystems_ez1_connected 0"));
}

#[test]
fn test_publish_raw_and_scaled_gauges() {
    // Given: A registry and an output payload
    let registry = create_test_registry();
    let output = endpoint(&registry, "getOutputData");

    // When: Publishing raw values
    assert_eq!(
        registry.publish(output, "p1", &json!(150)),
        PublishOutcome::Published
    );
    assert_eq!(
        registry.publish(output, "temp", &json!(215)),
        PublishOutcome::Published
    );

    // Then: Power is unchanged and temperature is scaled
    assert_eq!(registry.gauge_value("p1"), Some(150.0));
    assert_eq!(registry.gauge_value("temp"), Some(21.5));

    let rendered = registry.render().expect("Failed to render");
    assert!(rendered.contains("apsystems_ez1_p1 150"));
    assert!(rendered.contains("apsystems_ez1_temp 21.5"));
}

#[test]
fn test_publish_boolean_field() {
    let registry = create_test_registry();
    let alarm = endpoint(&registry, "getAlarm");

    registry.publish(alarm, "og", &json!(7));
    assert_eq!(registry.gauge_value("og"), Some(1.0));

    registry.publish(alarm, "og", &json!(0));
    assert_eq!(registry.gauge_value("og"), Some(0.0));
}

#[test]
fn test_publish_enum_state() {
    // Given: An enum field with three states
    let registry = create_test_registry();
    let onoff = endpoint(&registry, "getOnOff");

    // When: Publishing ordinal 1
    let outcome = registry.publish(onoff, "status", &json!(1));

    // Then: "on" is the active state, the others are exported as 0
    assert_eq!(outcome, PublishOutcome::Published);
    let rendered = registry.render().expect("Failed to render");
    assert!(rendered.contains("apsystems_ez1_status{status=\"on\"} 1"));
    assert!(rendered.contains("apsystems_ez1_status{status=\"off\"} 0"));
    assert!(rendered.contains("apsystems_ez1_status{status=\"fault\"} 0"));
}

#[test]
fn test_publish_enum_out_of_range() {
    // Given: An enum field currently "on"
    let registry = create_test_registry();
    let onoff = endpoint(&registry, "getOnOff");
    registry.publish(onoff, "status", &json!(1));

    // When: Publishing an ordinal without a label
    let outcome = registry.publish(onoff, "status", &json!(99));

    // Then: The unknown state is active and nothing fails
    assert_eq!(outcome, PublishOutcome::Published);
    let rendered = registry.render().expect("Failed to render");
    assert!(rendered.contains("apsystems_ez1_status{status=\"unknown\"} 1"));
    assert!(rendered.contains("apsystems_ez1_status{status=\"on\"} 0"));
}

#[test]
fn test_publish_info_replaces_previous_value() {
    // Given: An IP field published once
    let registry = create_test_registry();
    let info = endpoint(&registry, "getDeviceInfo");
    registry.publish(info, "ipAddr", &json!("192.168.1.20"));

    // When: The inverter reports a new address
    registry.publish(info, "ipAddr", &json!("192.168.1.21"));

    // Then: Only the latest value is exported
    let rendered = registry.render().expect("Failed to render");
    assert!(rendered.contains("apsystems_ez1_ipAddr_info{ipAddr=\"192.168.1.21\"} 1"));
    assert!(!rendered.contains("192.168.1.20"));
}

#[test]
fn test_scrape_during_updates_always_sees_a_series() {
    // Given: Info and enum fields that already carry a value
    let registry = create_test_registry();
    let info = endpoint(&registry, "getDeviceInfo");
    let onoff = endpoint(&registry, "getOnOff");
    registry.publish(info, "ipAddr", &json!("192.168.1.0"));
    registry.publish(onoff, "status", &json!(0));

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 1..500 {
                registry.publish(info, "ipAddr", &json!(format!("192.168.1.{}", i % 2)));
                registry.publish(onoff, "status", &json!(i % 2));
            }
        });

        // When: Scraping while a writer flips both values
        for _ in 0..200 {
            let rendered = registry.render().expect("Failed to render");

            // Then: Neither metric is ever without a live series
            assert!(
                rendered.contains("apsystems_ez1_ipAddr_info{"),
                "info series missing during update"
            );
            assert!(
                rendered
                    .lines()
                    .any(|l| l.starts_with("apsystems_ez1_status{") && l.ends_with(" 1")),
                "no active state during update"
            );
        }
    });
}

#[test]
fn test_resolved_enum_clears_unknown_state() {
    let registry = create_test_registry();
    let onoff = endpoint(&registry, "getOnOff");

    registry.publish(onoff, "status", &json!(99));
    registry.publish(onoff, "status", &json!(0));

    let rendered = registry.render().expect("Failed to render");
    assert!(rendered.contains("apsystems_ez1_status{status=\"off\"} 1"));
    assert!(!rendered.contains("status=\"unknown\""));
}

#[test]
fn test_republishing_same_info_value_keeps_series() {
    let registry = create_test_registry();
    let info = endpoint(&registry, "getDeviceInfo");

    registry.publish(info, "ipAddr", &json!("192.168.1.20"));
    registry.publish(info, "ipAddr", &json!("192.168.1.20"));

    let rendered = registry.render().expect("Failed to render");
    assert!(rendered.contains("apsystems_ez1_ipAddr_info{ipAddr=\"192.168.1.20\"} 1"));
}

#[test]
fn test_untyped_field_is_published_as_info() {
    let registry = create_test_registry();
    let info = endpoint(&registry, "getDeviceInfo");

    registry.publish(info, "devVer", &json!("EZ1 1.6.0"));

    let rendered = registry.render().expect("Failed to render");
    assert!(rendered.contains("apsystems_ez1_devVer_info{devVer=\"EZ1 1.6.0\"} 1"));
}

#[test]
fn test_unknown_field_is_noop() {
    // Given: A field the endpoint does not declare
    let registry = create_test_registry();
    let output = endpoint(&registry, "getOutputData");

    // When: Publishing it
    let outcome = registry.publish(output, "p3", &json!(10));

    // Then: A warning outcome is returned and nothing is written
    assert_eq!(
        outcome,
        PublishOutcome::Skipped(FieldMappingWarning::UnknownField {
            endpoint: "getOutputData".to_string(),
            field: "p3".to_string(),
        })
    );
    assert!(!registry.render().expect("Failed to render").contains("p3"));
}

#[test]
fn test_field_of_other_endpoint_is_unknown() {
    // Given: "og" belongs to getAlarm, not getOutputData
    let registry = create_test_registry();
    let output = endpoint(&registry, "getOutputData");

    let outcome = registry.publish(output, "og", &json!(1));

    assert!(matches!(
        outcome,
        PublishOutcome::Skipped(FieldMappingWarning::UnknownField { .. })
    ));
    assert_eq!(registry.gauge_value("og"), Some(0.0));
}

#[test]
fn test_unconvertible_value_is_skipped() {
    // Given: p1 holding a previous reading
    let registry = create_test_registry();
    let output = endpoint(&registry, "getOutputData");
    registry.publish(output, "p1", &json!(120));

    // When: The inverter sends text instead of a number
    let outcome = registry.publish(output, "p1", &json!({"nested": true}));

    // Then: The write is skipped and the previous value stays
    assert!(matches!(
        outcome,
        PublishOutcome::Skipped(FieldMappingWarning::Unconvertible { .. })
    ));
    assert_eq!(registry.gauge_value("p1"), Some(120.0));
}

#[test]
fn test_publish_endpoint_counts_published_fields() {
    let registry = create_test_registry();
    let output = endpoint(&registry, "getOutputData");
    let data = json!({ "p1": 150, "p2": 0, "p9": 3, "temp": "bad" });
    let data = data.as_object().expect("object");

    let published = registry.publish_endpoint(output, data);

    assert_eq!(published, 2);
    assert_eq!(registry.gauge_value("p1"), Some(150.0));
    assert_eq!(registry.gauge_value("p2"), Some(0.0));
}

#[test]
fn test_publish_disconnected_zeroes_power() {
    // Given: A connected inverter producing power
    let registry = create_test_registry();
    let output = endpoint(&registry, "getOutputData");
    registry.set_connected(true);
    registry.publish(output, "p1", &json!(150));
    registry.publish(output, "p2", &json!(98));
    registry.publish(output, "temp", &json!(300));

    // When: The inverter goes offline
    registry.publish_disconnected();

    // Then: connected and both power outputs are 0, other gauges untouched
    assert_eq!(registry.connected.get(), 0);
    assert_eq!(registry.gauge_value("p1"), Some(0.0));
    assert_eq!(registry.gauge_value("p2"), Some(0.0));
    assert_eq!(registry.gauge_value("temp"), Some(30.0));
}

#[test]
fn test_publish_disconnected_without_power_fields() {
    // Given: A schema without p1/p2
    let schema = MetricSchema::load(r#"{ "getAlarm": { "data": [ { "name": "og", "type": "IO" } ] } }"#)
        .expect("Failed to load schema");
    let registry = MetricRegistry::build(schema).expect("Failed to build registry");
    registry.set_connected(true);

    // When: Publishing the disconnected state
    registry.publish_disconnected();

    // Then: Only connected changes
    assert_eq!(registry.connected.get(), 0);
    assert_eq!(registry.gauge_value("p1"), None);
}

#[test]
fn test_field_clashing_with_fixed_metric_is_schema_error() {
    // Given: A schema field named like a built-in metric
    let schema = MetricSchema::load(
        r#"{ "getStatus": { "data": [ { "name": "connected", "type": "IO" } ] } }"#,
    )
    .expect("Schema itself is valid");

    // When: Building the registry
    let result = MetricRegistry::build(schema);

    // Then: Registration fails with a schema error
    assert!(matches!(result, Err(ExporterError::Schema(_))));
}

#[test]
fn test_invalid_metric_name_is_schema_error() {
    let schema = MetricSchema::load(
        r#"{ "getStatus": { "data": [ { "name": "power-out", "type": "POWER" } ] } }"#,
    )
    .expect("Schema itself is valid");

    assert!(matches!(
        MetricRegistry::build(schema),
        Err(ExporterError::Schema(_))
    ));
}

#[test]
fn test_builtin_schema_registers() {
    let schema = MetricSchema::builtin().expect("Built-in schema must load");

    let registry = MetricRegistry::build(schema).expect("Built-in schema must register");

    let rendered = registry.render().expect("Failed to render");
    assert!(rendered.contains("apsystems_ez1_p1"));
    assert!(rendered.contains("apsystems_ez1_status{status=\"on\"} 0"));
}

#[test]
fn test_metrics_rendering_is_stable() {
    let registry = create_test_registry();
    registry.set_connected(true);

    let render1 = registry.render().expect("First render failed");
    let render2 = registry.render().expect("Second render failed");

    assert_eq!(render1, render2, "Metrics rendering is not stable");
}
