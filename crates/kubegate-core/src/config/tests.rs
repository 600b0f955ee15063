use std::io::Write;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 7] = [
    "KUBEGATE_TIMEOUT",
    "KUBEGATE_KUBECTL_BIN",
    "KUBEGATE_DESTRUCTIVE_VERBS",
    "KUBEGATE_REDACT_KEYS",
    "KUBEGATE_SPAN_DESTINATION",
    "KUBEGATE_OTEL_EXPORTER",
    "KUBEGATE_OTEL_ENDPOINT",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("kubegate.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{body}").unwrap();
    path
}

#[test]
fn defaults_when_file_missing() {
    let config = Config::default();
    assert_eq!(config.tools.timeout, 30);
    assert_eq!(config.tools.max_stderr_bytes, 32 * 1024);
    assert_eq!(config.tools.kubectl.binary, "kubectl");
    assert_eq!(config.tools.kubectl.default_output, "json");
    assert_eq!(config.tools.risk.destructive_verbs.len(), 6);
    assert_eq!(config.tools.trace.omit_keys, ["session"]);
    assert_eq!(config.tools.trace.placeholder, "***");
    assert!(config.observability.exporter.is_empty());
    assert_eq!(config.observability.endpoint, "http://localhost:4317");
    config.validate().unwrap();
}

#[test]
#[serial]
fn missing_file_loads_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.tools.timeout, 30);
}

#[test]
#[serial]
fn parse_valid_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[tools]
timeout = 5

[tools.kubectl]
binary = "/usr/local/bin/kubectl"
default_output = "yaml"

[tools.risk]
destructive_verbs = ["delete", "drain"]
confirm_patterns = ["rollout restart*"]

[tools.trace]
redact_keys = ["context"]
destination = "off"

[observability]
exporter = "otlp"
"#,
    );

    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.tools.timeout, 5);
    assert_eq!(config.tools.kubectl.binary, "/usr/local/bin/kubectl");
    assert_eq!(config.tools.kubectl.default_output, "yaml");
    assert_eq!(config.tools.kubectl.context_flag, "--context");
    assert_eq!(config.tools.risk.destructive_verbs, ["delete", "drain"]);
    assert_eq!(config.tools.risk.confirm_patterns, ["rollout restart*"]);
    assert_eq!(config.tools.trace.redact_keys, ["context"]);
    assert_eq!(config.tools.trace.destination, "off");
    assert_eq!(config.observability.exporter, "otlp");
    assert_eq!(config.observability.endpoint, "http://localhost:4317");
}

#[test]
#[serial]
fn malformed_toml_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[tools\ntimeout = ");
    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("failed to parse config file"));
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[tools]\ntimeout = 5\n");

    clear_env();
    unsafe {
        std::env::set_var("KUBEGATE_TIMEOUT", "12");
        std::env::set_var("KUBEGATE_KUBECTL_BIN", "/opt/kubectl");
        std::env::set_var("KUBEGATE_DESTRUCTIVE_VERBS", "delete, cordon ,,drain");
        std::env::set_var("KUBEGATE_REDACT_KEYS", "context,namespace");
        std::env::set_var("KUBEGATE_SPAN_DESTINATION", "stdout");
        std::env::set_var("KUBEGATE_OTEL_EXPORTER", "otlp");
        std::env::set_var("KUBEGATE_OTEL_ENDPOINT", "http://collector:4317");
    }

    let config = Config::load(&path).unwrap();
    clear_env();

    assert_eq!(config.tools.timeout, 12);
    assert_eq!(config.tools.kubectl.binary, "/opt/kubectl");
    assert_eq!(
        config.tools.risk.destructive_verbs,
        ["delete", "cordon", "drain"]
    );
    assert_eq!(config.tools.trace.redact_keys, ["context", "namespace"]);
    assert_eq!(config.tools.trace.destination, "stdout");
    assert_eq!(config.observability.exporter, "otlp");
    assert_eq!(config.observability.endpoint, "http://collector:4317");
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[tools]\ntimeout = 5\n");

    clear_env();
    unsafe {
        std::env::set_var("KUBEGATE_TIMEOUT", "soon");
        std::env::set_var("KUBEGATE_DESTRUCTIVE_VERBS", " , ");
        std::env::set_var("KUBEGATE_KUBECTL_BIN", "  ");
    }

    let config = Config::load(&path).unwrap();
    clear_env();

    assert_eq!(config.tools.timeout, 5);
    assert_eq!(config.tools.risk.destructive_verbs.len(), 6);
    assert_eq!(config.tools.kubectl.binary, "kubectl");
}

#[test]
#[serial]
fn zero_timeout_from_env_is_ignored() {
    clear_env();
    unsafe { std::env::set_var("KUBEGATE_TIMEOUT", "0") };
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    clear_env();
    assert_eq!(config.tools.timeout, 30);
}

#[test]
fn validate_rejects_unusable_settings() {
    let mut config = Config::default();
    config.tools.timeout = 0;
    assert!(config.validate().unwrap_err().to_string().contains("timeout"));

    let mut config = Config::default();
    config.tools.max_stdout_bytes = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.tools.max_stderr_bytes = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.tools.risk.destructive_verbs = vec![" ".into()];
    assert!(
        config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("destructive_verbs")
    );

    let mut config = Config::default();
    config.tools.risk.max_pending_per_session = 0;
    assert!(config.validate().is_err());
}
