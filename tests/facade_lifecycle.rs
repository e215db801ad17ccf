//! Registry ownership across facade construction and close.

mod common;

use common::{addr, facade, facade_on, scrape};
use std::sync::Arc;
use wirestat::config::{Match, MetricsConfig};
use wirestat::metrics::{ConnectionMetrics, MetricRegistry, MetricsFacade, RegistryDirectory, Surface};

fn named(name: &str) -> MetricsConfig {
    MetricsConfig {
        registry_name: Some(name.to_string()),
        ..MetricsConfig::default()
    }
}

#[test]
fn test_exclusive_registry_shut_down_on_close() {
    let facade = facade();
    let server = facade.create_http_server_metrics(addr("127.0.0.1:80")).unwrap();
    server.connected(addr("10.1.1.1:1234"));
    assert!(!facade.registry().is_empty());

    facade.close();
    assert!(server.is_closed());
    assert!(facade.registry().is_empty());
    assert!(facade.registry().gather_text().is_empty());
}

#[test]
fn test_injected_registry_survives_close() {
    let registry = Arc::new(MetricRegistry::new());
    let first = facade_on(&registry);
    let second = facade_on(&registry);
    let a = first.create_http_server_metrics(addr("127.0.0.1:80")).unwrap();
    let b = second.create_http_server_metrics(addr("127.0.0.1:81")).unwrap();
    a.connected(None);
    b.connected(None);

    first.close();
    assert!(a.is_closed());
    assert!(!b.is_closed());
    let lines = scrape(&registry, "http_servers_connections");
    assert_eq!(lines, vec![r#"http_servers_connections{local="127.0.0.1:81",remote="?"} 1"#]);
}

#[test]
fn test_named_registry_owned_by_creator() {
    let directory = Arc::new(RegistryDirectory::new());
    let creator = MetricsFacade::with_directory(named("app"), Arc::clone(&directory)).unwrap();
    let joiner = MetricsFacade::with_directory(named("app"), Arc::clone(&directory)).unwrap();
    assert!(Arc::ptr_eq(creator.registry(), joiner.registry()));
    assert_eq!(directory.len(), 1);

    let pool = joiner.create_pool_metrics("worker", "w", 2).unwrap();
    joiner.close();
    assert!(pool.is_closed());
    assert_eq!(directory.len(), 1);
    assert!(creator.registry().contains("runtime_timers"));

    creator.close();
    assert!(directory.is_empty());
    assert!(creator.registry().is_empty());
}

#[test]
fn test_unnamed_directory_facade_is_exclusive() {
    let directory = Arc::new(RegistryDirectory::new());
    let facade = MetricsFacade::with_directory(MetricsConfig::default(), Arc::clone(&directory)).unwrap();
    assert!(directory.is_empty());
    facade.close();
    assert!(facade.registry().is_empty());
}

#[test]
fn test_namespace_and_static_labels() {
    let mut config = MetricsConfig::default();
    config.namespace = Some("app".to_string());
    config.labels.insert("region".to_string(), "eu-west".to_string());
    let facade = MetricsFacade::new(config).unwrap();
    facade.timer_created();

    let lines = scrape(facade.registry(), "app_runtime_timers");
    assert_eq!(lines, vec![r#"app_runtime_timers{region="eu-west"} 1"#]);
}

#[test]
fn test_base_name_override_and_uri_filter() {
    let mut config = MetricsConfig::default();
    config.base_names.http_servers = "web".to_string();
    config.monitored_http_server_uris = vec![Match::equals("/health"), Match::regex("/api/.*").with_alias("api")];
    let facade = MetricsFacade::new(config).unwrap();
    let server = facade.create_http_server_metrics(None).unwrap();

    for uri in ["/health", "/api/users", "/api/orders", "/favicon.ico"] {
        server.end_request(server.begin_request("GET", uri), 200);
    }

    assert_eq!(server.base_name(), "web");
    let snap = server.snapshot();
    let requests = &snap["requests"];
    assert_eq!(requests.samples.len(), 3);
    assert_eq!(requests.count(&[("uri", "/health")]), Some(1));
    assert_eq!(requests.count(&[("uri", "api")]), Some(2));
    assert_eq!(requests.count(&[("uri", "*")]), Some(1));
    assert!(facade.registry().contains("web_requests"));
}

#[test]
fn test_closed_surfaces_survive_late_events() {
    let facade = facade();
    let server = facade.create_http_server_metrics(None).unwrap();
    let bus = facade.create_event_bus_metrics().unwrap();
    let pool = facade.create_pool_metrics("worker", "w", 1).unwrap();
    let handler = bus.handler_registered("x");
    let queued = pool.submitted();
    let request = server.begin_request("GET", "/");

    facade.close();

    server.end_request(request, 500);
    server.websocket_disconnected();
    bus.begin_handle(&handler, true);
    bus.end_handle(&handler, None);
    bus.handler_unregistered(handler);
    let usage = pool.begin(queued);
    pool.end(usage, false);
    facade.deployed("late");
    assert!(facade.registry().is_empty());
}

#[test]
fn test_dropped_surfaces_release_injected_registry() {
    let registry = Arc::new(MetricRegistry::new());
    let facade = facade_on(&registry);
    let baseline = registry.len();
    {
        let server = facade.create_http_server_metrics(addr("10.0.0.1:80")).unwrap();
        server.connected(None);
        let pool = facade.create_pool_metrics("worker", "w", 2).unwrap();
        let _queued = pool.submitted();
        assert!(registry.contains("http_servers_connections"));
    }

    assert!(!registry.contains("http_servers_connections"));
    assert!(!registry.contains("pools_queue_size"));
    assert_eq!(registry.len(), baseline);
    assert!(scrape(&registry, "http_servers_").is_empty());

    facade.close();
    assert!(scrape(&registry, "pools_").is_empty());
}

#[test]
fn test_static_label_shadowing_surface_key_rejected() {
    let mut config = MetricsConfig::default();
    config.labels.insert("local".to_string(), "x".to_string());
    let err = MetricsFacade::new(config).err().expect("facade should be rejected");
    assert_eq!(err.error_code(), "config");
    assert!(err.to_string().contains("local"));
}
