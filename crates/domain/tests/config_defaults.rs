use tm_domain::config::{Config, ConfigSeverity, ToolErrorPolicy};

#[test]
fn defaults_match_reference_timings() {
    let config = Config::default();
    assert_eq!(config.registry.lease_secs, 3_600);
    assert_eq!(config.registry.gc_interval_secs, 60);
    assert_eq!(config.connection.keepalive_interval_secs, 10);
    assert_eq!(config.bus.request_timeout_ms, 5_000);
}

#[test]
fn default_hub_binds_localhost() {
    let config = Config::default();
    assert_eq!(config.hub.bind_addr(), "127.0.0.1:4280");
    assert!(config.bus.url.starts_with("ws://127.0.0.1:4280"));
}

#[test]
fn session_defaults() {
    let config = Config::default();
    assert!((config.session.temperature - 0.2).abs() < f32::EPSILON);
    assert!((config.session.top_p - 0.95).abs() < f32::EPSILON);
    assert_eq!(config.session.max_output_tokens, 8_192);
    assert!(!config.session.use_local_tool);
    assert_eq!(config.session.tool_error_policy, ToolErrorPolicy::Abort);
}

#[test]
fn partial_file_keeps_other_defaults() {
    let toml_str = r#"
[registry]
lease_secs = 120

[session]
tool_error_policy = "report_to_model"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.registry.lease_secs, 120);
    assert_eq!(config.registry.gc_interval_secs, 60);
    assert_eq!(config.session.tool_error_policy, ToolErrorPolicy::ReportToModel);
    assert_eq!(config.hub.port, 4280);
}

#[test]
fn default_config_validates_clean() {
    assert!(Config::default().validate().is_empty());
}

#[test]
fn zero_port_is_an_error() {
    let mut config = Config::default();
    config.hub.port = 0;
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "hub.port" && i.severity == ConfigSeverity::Error));
}

#[test]
fn zero_max_turns_is_an_error() {
    let mut config = Config::default();
    config.session.max_turns = 0;
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "session.max_turns" && i.severity == ConfigSeverity::Error));
}

#[test]
fn short_lease_is_a_warning() {
    let mut config = Config::default();
    config.registry.lease_secs = 30;
    let issues = config.validate();
    let lease = issues.iter().find(|i| i.field == "registry.lease_secs").unwrap();
    assert_eq!(lease.severity, ConfigSeverity::Warning);
}
