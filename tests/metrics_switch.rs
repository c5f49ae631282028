///! Tests for the process-wide metrics switch
///!
///! Kept in their own test binary: the switch is global and would race with
///! other tests recording metrics.
use kuba_federation::config::MonitoringConfig;
use kuba_federation::metrics::{self, BACKEND_FAILURES_TOTAL, FIND_REQUESTS_TOTAL};
use kuba_federation::remote::RemoteBackend;
use std::time::Duration;

fn failures(backend: &str) -> f64 {
    BACKEND_FAILURES_TOTAL.with_label_values(&[backend]).get()
}

#[test]
fn test_disabled_metrics_record_nothing() {
    let disabled = MonitoringConfig {
        metrics_enabled: false,
        ..MonitoringConfig::default()
    };
    metrics::configure(&disabled);
    assert!(!metrics::is_enabled());

    let backend = RemoteBackend::new("switch-host:80", Duration::from_secs(60));
    let before = failures("switch-host:80");
    let finds_before = FIND_REQUESTS_TOTAL.with_label_values(&["cached"]).get();

    backend.fail();
    metrics::record_find("cached");

    assert_eq!(failures("switch-host:80"), before);
    assert_eq!(FIND_REQUESTS_TOTAL.with_label_values(&["cached"]).get(), finds_before);
    // Health tracking does not depend on metrics
    assert!(!backend.is_available());

    metrics::configure(&MonitoringConfig::default());
    assert!(metrics::is_enabled());

    backend.fail();
    assert_eq!(failures("switch-host:80"), before + 1.0);
}
