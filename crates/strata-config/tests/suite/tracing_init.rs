use std::sync::Arc;

use strata_config::{init_tracing, LoggingConfig};

#[test]
fn init_tracing_installs_once_and_records_lines() {
    let config = LoggingConfig {
        level: "strata.test=info".to_owned(),
        stderr: false,
        ..LoggingConfig::default()
    };
    let first = init_tracing(&config);
    let second = init_tracing(&LoggingConfig::default());
    assert!(Arc::ptr_eq(&first, &second));

    tracing::info!(target: "strata.test", unit = "ws/a", "captured line");
    tracing::debug!(target: "strata.test", "filtered line");
    let lines = first.tail(50);
    assert!(lines.iter().any(|line| line.contains("captured line")));
    assert!(!lines.iter().any(|line| line.contains("filtered line")));
}
