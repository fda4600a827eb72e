//! Integration tests for settings loading.

use dbaas_authz_core::config::Settings;
use dbaas_authz_core::error::ErrorCode;
use dbaas_authz_core::telemetry::LogFormat;
use std::io::Write;
use std::time::Duration;

fn write_settings(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_toml_file() {
    let file = write_settings(
        r#"
[controller]
max_concurrent_reconciles = 3
requeue_base_delay = "50ms"
requeue_max_delay = "2m"
shutdown_grace = "1s"

[operator]
install_namespace = "dbaas-operator"
create_default_config = false

[access_review]
endpoint = "https://api.cluster:6443"
timeout = "3s"

[logging]
level = "debug"
format = "pretty"
"#,
    );

    let settings = Settings::from_file(file.path()).unwrap();
    assert_eq!(settings.controller.max_concurrent_reconciles, 3);
    assert_eq!(settings.controller.requeue_base_delay, Duration::from_millis(50));
    assert_eq!(settings.controller.requeue_max_delay, Duration::from_secs(120));
    assert_eq!(settings.controller.acquire_timeout, Duration::from_secs(30));
    assert_eq!(settings.operator.install_namespace, "dbaas-operator");
    assert!(!settings.operator.create_default_config);
    assert_eq!(
        settings.access_review.endpoint.as_deref(),
        Some("https://api.cluster:6443")
    );
    assert_eq!(settings.access_review.timeout, Duration::from_secs(3));
    assert_eq!(settings.logging.format, LogFormat::Pretty);

    let reviewer = settings.access_review.http_reviewer().unwrap();
    assert!(reviewer.is_some());
}

#[test]
fn test_empty_file_uses_defaults() {
    let file = write_settings("");
    let settings = Settings::from_file(file.path()).unwrap();
    assert_eq!(settings.controller.max_concurrent_reconciles, 6);
    assert_eq!(settings.operator.install_namespace, "openshift-dbaas-operator");
}

#[test]
fn test_invalid_file_is_rejected() {
    let file = write_settings(
        r#"
[controller]
max_concurrent_reconciles = 0
"#,
    );
    let err = Settings::from_file(file.path()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
}
