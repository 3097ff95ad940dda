//! CLI integration tests

use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

fn flowctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_flowctl"))
        .args(args)
        .env("RUST_LOG", "off")
        .env("HOME", std::env::temp_dir())
        .output()
        .expect("Failed to execute command")
}

fn fixture(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("Failed to create fixture");
    file.write_all(content.as_bytes())
        .expect("Failed to write fixture");
    file
}

fn path(file: &NamedTempFile) -> &str {
    file.path().to_str().expect("Fixture path is not UTF-8")
}

const METRICS: &str = r#"[
  {"source": {"namespace": "frontend"}, "destination": {"namespace": "backend"}, "stats": {"sum": 90.0}},
  {"source": {"namespace": "backend"}, "destination": {"namespace": "frontend"}, "stats": {"sum": 40.0}},
  {"source": {"namespace": "backend"}, "destination": {"namespace": "db"}, "stats": {"sum": 100.0}}
]"#;

const RULES: &str = r#"[
  {
    "name": "PacketDropsByKernel",
    "labels": {"severity": "warning"},
    "annotations": {
      "summary": "Drops in {{ $labels.namespace }}",
      "netobserv_io_network_health": "{\"namespaceLabels\": [\"namespace\"], \"threshold\": \"10\", \"upperBound\": \"100\"}"
    },
    "alerts": [
      {"state": "firing", "value": "55", "labels": {"namespace": "backend", "severity": "warning"}}
    ]
  },
  {"name": "IngressErrors", "labels": {"severity": "critical"}}
]"#;

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = flowctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("network flow topology"), "Should show about text");
    assert!(stdout.contains("topology"), "Should show topology command");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("filter"), "Should show filter command");
    assert!(stdout.contains("--dump-metrics"), "Should show metrics flag");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = flowctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("flowctl"), "Should show binary name");
}

/// Test topology subcommand help
#[test]
fn test_topology_help() {
    let output = flowctl(&["topology", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for flag in ["--metrics", "--scope", "--group", "--search", "--expected", "--previous"] {
        assert!(stdout.contains(flag), "Should show {flag} option");
    }
}

#[test]
fn test_topology_json_merges_edges() {
    let metrics = fixture(METRICS);
    let output = flowctl(&["--format", "json", "topology", "--metrics", path(&metrics)]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let model: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    assert_eq!(model["nodes"].as_array().map(Vec::len), Some(3));
    let edges = model["edges"].as_array().expect("edges");
    assert_eq!(edges.len(), 2);

    let merged = edges
        .iter()
        .find(|e| e["id"] == "n=frontend~n=backend")
        .expect("merged edge");
    assert_eq!(merged["start_terminal"], "directional");
    assert_eq!(merged["stat"], 40.0);
}

#[test]
fn test_topology_groups_and_expected_nodes() {
    let metrics = fixture(METRICS);
    let output = flowctl(&[
        "--format",
        "json",
        "topology",
        "--metrics",
        path(&metrics),
        "--scope",
        "namespace",
        "--expected",
        "idle",
    ]);
    assert!(output.status.success());

    let model: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    let idle = model["nodes"]
        .as_array()
        .and_then(|nodes| nodes.iter().find(|n| n["label"] == "idle"))
        .expect("placeholder node");
    assert_eq!(idle["no_metrics"], true);
}

#[test]
fn test_topology_invalid_group_rejected() {
    let metrics = fixture(METRICS);
    let output = flowctl(&["topology", "--metrics", path(&metrics), "--group", "pods"]);
    assert!(!output.status.success(), "Unknown grouping should fail to parse");
}

#[test]
fn test_topology_missing_file_fails() {
    let output = flowctl(&["topology", "--metrics", "/nonexistent/metrics.json"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Failed to read"), "stderr: {stderr}");
}

#[test]
fn test_topology_table_output() {
    let metrics = fixture(METRICS);
    let output = flowctl(&["topology", "--metrics", path(&metrics)]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Nodes"));
    assert!(stdout.contains("Edges"));
    assert!(stdout.contains("frontend"));
}

#[test]
fn test_topology_with_health_decoration() {
    let metrics = fixture(METRICS);
    let rules = fixture(RULES);
    let output = flowctl(&[
        "--format",
        "json",
        "topology",
        "--metrics",
        path(&metrics),
        "--rules",
        path(&rules),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let model: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    let backend = model["nodes"]
        .as_array()
        .and_then(|nodes| nodes.iter().find(|n| n["id"] == "n=backend"))
        .expect("backend node");
    assert!(backend["health"]["score"].as_f64().expect("score") < 10.0);
}

#[test]
fn test_health_json() {
    let rules = fixture(RULES);
    let output = flowctl(&["--format", "json", "health", "--rules", path(&rules)]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    let namespaces = report["stats"]["by_namespace"].as_array().expect("namespaces");
    assert_eq!(namespaces.len(), 1);
    assert_eq!(namespaces[0]["name"], "backend");
    assert_eq!(report["stats"]["global"]["score"], 10.0);
}

#[test]
fn test_health_table_output() {
    let rules = fixture(RULES);
    let output = flowctl(&["health", "--rules", path(&rules)]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Global score"));
    assert!(stdout.contains("PacketDropsByKernel"));
    assert!(stdout.contains("Items"), "Should show item count column");
}

#[test]
fn test_filter_adds_directional_filter() {
    let output = flowctl(&[
        "--format",
        "json",
        "filter",
        "--scope",
        "namespace",
        "--dir",
        "dst",
        "--namespace",
        "backend",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let filters: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    assert_eq!(filters[0]["def"]["id"], "dst_namespace");
    assert_eq!(filters[0]["values"][0]["v"], "backend");
}

#[test]
fn test_filter_without_fields_fails() {
    let output = flowctl(&["filter", "--scope", "namespace", "--dir", "src"]);
    assert!(!output.status.success());
}

#[test]
fn test_dump_metrics() {
    let rules = fixture(RULES);
    let output = flowctl(&["--dump-metrics", "health", "--rules", path(&rules)]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("flow_engine_build_latency_seconds"));
    assert!(stdout.contains("flow_engine_health_resources"));
}

#[test]
fn test_config_file_disables_edges() {
    let metrics = fixture(METRICS);
    let config = fixture(r#"{"topology": {"edges": false}}"#);
    let output = flowctl(&[
        "--config",
        path(&config),
        "--format",
        "json",
        "topology",
        "--metrics",
        path(&metrics),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let model: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    assert_eq!(model["edges"].as_array().map(Vec::len), Some(0));
}
