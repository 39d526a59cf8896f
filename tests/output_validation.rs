//! Output Validation Tests
//!
//! The JSON printed with `--json` is consumed by scripts, so its shape is a contract:
//! - Envelope fields and error codes
//! - The result set as a flat array
//! - Deficiency and identity tally layout

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;

use fncm_prereq::config::{Identity, RequiredField};
use fncm_prereq::preflight::{Requirement, Tool};
use fncm_prereq::probe::{LatencyClass, ProbeFailure, ProbeKind};
use fncm_prereq::{
    Deficiencies, EntityKey, EntityOutcome, ErrorEnvelope, IdentityTally, Metadata, PrereqError,
    Report, SuccessEnvelope, ValidationResults,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap()
}

fn sample_report() -> Report {
    let mut results = ValidationResults::new();
    results.record(
        EntityKey::database("GCD"),
        EntityOutcome::passed("Connected to gcddb").with_round_trip(Duration::from_millis(4), ProbeKind::Database),
    );
    results.record(
        EntityKey::directory("LDAP"),
        EntityOutcome::failed("Bind to ldap://ldap.example.com:389 failed", "check the bind DN and password"),
    );
    results.record(EntityKey::storage_class("nfs-client"), EntityOutcome::passed("claim Bound"));

    let identities = IdentityTally::new(&[Identity::user("ceadmin"), Identity::group("p8admins")])
        .with_hit("ceadmin", "LDAP");

    let expected = vec![
        EntityKey::directory("LDAP"),
        EntityKey::storage_class("nfs-client"),
        EntityKey::database("GCD"),
    ];
    Report { passed: results.all_passed(&expected), results, identities, expected }
}

// ============================================================================
// Envelopes
// ============================================================================

#[test]
fn test_success_envelope_shape() {
    let envelope = SuccessEnvelope::new("validate", sample_report(), Metadata::with_entities(1250, 3));
    let value = to_value(&envelope);

    assert_eq!(value["ok"], json!(true));
    assert_eq!(value["command"], json!("validate"));
    assert_eq!(value["meta"], json!({"execution_ms": 1250, "entities_checked": 3}));
    assert_eq!(value["data"]["passed"], json!(false));
    assert!(value["data"].get("expected").is_none());
}

#[test]
fn test_error_envelope_shape() {
    let err = PrereqError::config_error("Unsupported FNCM_Version 5.5.99");
    let value = to_value(&ErrorEnvelope::from_error("check", &err));

    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["command"], json!("check"));
    assert_eq!(value["error"]["code"], json!("CONFIG_ERROR"));
    assert!(value["error"]["message"].as_str().unwrap().contains("5.5.99"));
    assert!(value.get("data").is_none());
}

#[test]
fn test_error_codes_are_screaming_snake_case() {
    let errors = [
        PrereqError::config_error("x"),
        PrereqError::missing_tool("x"),
        PrereqError::certificate_error("x"),
        PrereqError::command_failed("java", "x"),
        PrereqError::connection_failed("x"),
        PrereqError::authentication_failed("x"),
        PrereqError::invalid_input("x"),
        PrereqError::preflight_failed("x"),
    ];
    for err in &errors {
        let code = err.error_code();
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c == '_'), "bad code {code}");
    }
}

// ============================================================================
// Result Set
// ============================================================================

#[test]
fn test_results_are_a_flat_array_in_key_order() {
    let report = sample_report();
    let value = to_value(&report.results);
    let entries = value.as_array().unwrap();

    let keys: Vec<(&str, &str)> = entries
        .iter()
        .map(|e| (e["kind"].as_str().unwrap(), e["name"].as_str().unwrap()))
        .collect();
    assert_eq!(keys, vec![("directory", "LDAP"), ("storage_class", "nfs-client"), ("database", "GCD")]);

    assert_eq!(
        entries[2],
        json!({
            "kind": "database",
            "name": "GCD",
            "passed": true,
            "detail": "Connected to gcddb",
            "round_trip_ms": 4,
            "latency": "acceptable"
        })
    );
    assert_eq!(entries[0]["hint"], json!("check the bind DN and password"));
    assert!(entries[1].get("hint").is_none());
}

#[test]
fn test_identity_tally_layout() {
    let value = to_value(&sample_report().identities);
    assert_eq!(
        value,
        json!({
            "entries": [
                {"name": "ceadmin", "kind": "user", "count": 1, "directories": ["LDAP"]},
                {"name": "p8admins", "kind": "group", "count": 0, "directories": []}
            ]
        })
    );
}

#[test]
fn test_latency_and_failure_labels() {
    assert_eq!(to_value(&LatencyClass::PerformanceDegradation), json!("performance_degradation"));
    assert_eq!(LatencyClass::PerformanceDegradation.to_string(), "Performance Degradation");
    assert_eq!(
        to_value(&ProbeFailure::HostUnknown("db.example.com".into())),
        json!({"kind": "host_unknown", "detail": "db.example.com"})
    );
    assert_eq!(to_value(&ProbeFailure::TimedOut(10)), json!({"kind": "timed_out", "detail": 10}));
}

// ============================================================================
// Deficiencies
// ============================================================================

#[test]
fn test_check_envelope_snapshot() {
    let deficiencies = Deficiencies {
        required_fields: vec![RequiredField {
            file: "fncm_db_server.toml".into(),
            path: vec!["GCD".into(), "DATABASE_PASSWORD".into()],
        }],
        requirements: vec![
            Requirement::Tool { tool: Tool::Keytool },
            Requirement::JavaVersion { required: 17, found: Some(11) },
        ],
        certificates: Vec::new(),
    };
    let envelope = SuccessEnvelope::new("check", &deficiencies, Metadata::new(7));
    let json_str = serde_json::to_string(&envelope).unwrap();

    insta::assert_snapshot!(json_str, @r#"{"ok":true,"command":"check","data":{"required_fields":[{"file":"fncm_db_server.toml","path":["GCD","DATABASE_PASSWORD"]}],"requirements":[{"kind":"tool","tool":"keytool"},{"kind":"java_version","required":17,"found":11}],"certificates":[]},"meta":{"execution_ms":7}}"#);
}

#[test]
fn test_deficiency_lines_follow_field_tool_certificate_order() {
    let deficiencies = Deficiencies {
        required_fields: vec![RequiredField { file: "fncm_ldap_server.toml".into(), path: vec!["LDAP".into(), "LDAP_BIND_DN".into()] }],
        requirements: vec![Requirement::ClusterLogin],
        certificates: Vec::new(),
    };
    let lines = deficiencies.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "fncm_ldap_server.toml: LDAP.LDAP_BIND_DN is required");
    assert!(lines[1].contains("kubectl get pods"));
}
