use super::*;
use crate::endpoints::{resolve, BackendPort, ResolveError, ResolvedBackend};

#[test]
fn addresses_are_deduplicated_and_sorted() {
    let mut index = Index::default();
    index.apply(mk_service("default", "web", &[("http", 80)]));
    index.apply(mk_slice(
        "default",
        "web-a",
        "web",
        &[("http", 8080)],
        &[Addr("10.0.0.2", Some(true)), Addr("10.0.0.1", Some(true))],
    ));
    index.apply(mk_slice(
        "default",
        "web-b",
        "web",
        &[("http", 8080)],
        &[Addr("10.0.0.1", Some(true))],
    ));

    let resolved = resolve(&index, "default", "web", BackendPort::Number(80))
        .expect("backend must resolve");
    assert_eq!(
        resolved,
        ResolvedBackend {
            port: 8080,
            protocol: "TCP".to_string(),
            addresses: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
        }
    );
}

#[test]
fn unknown_readiness_is_ready() {
    let index = web_index();
    let resolved = resolve(&index, "default", "web", BackendPort::Name("http"))
        .expect("backend must resolve");
    // 10.0.0.9 is explicitly not ready.
    assert_eq!(resolved.addresses, vec!["10.0.0.1", "10.0.0.2"]);
}

#[test]
fn no_ready_addresses() {
    let mut index = Index::default();
    index.apply(mk_service("default", "web", &[("http", 80)]));
    index.apply(mk_slice(
        "default",
        "web-a",
        "web",
        &[("http", 8080)],
        &[Addr("10.0.0.1", Some(false))],
    ));
    assert!(matches!(
        resolve(&index, "default", "web", BackendPort::Number(80)),
        Err(ResolveError::NoReadyAddresses)
    ));
}

#[test]
fn no_matching_port() {
    let mut index = Index::default();
    index.apply(mk_service("default", "web", &[("http", 80), ("admin", 9000)]));
    index.apply(mk_slice(
        "default",
        "web-a",
        "web",
        &[("http", 8080)],
        &[Addr("10.0.0.1", Some(true))],
    ));
    assert!(matches!(
        resolve(&index, "default", "web", BackendPort::Number(9000)),
        Err(ResolveError::NoMatchingPort)
    ));
    assert!(matches!(
        resolve(&index, "default", "web", BackendPort::Name("grpc")),
        Err(ResolveError::NoMatchingPort)
    ));
}

#[test]
fn missing_service() {
    let index = Index::default();
    assert!(matches!(
        resolve(&index, "default", "web", BackendPort::Number(80)),
        Err(ResolveError::ServiceNotFound { .. })
    ));
}

#[test]
fn unnamed_numeric_port_uses_first_slice_port() {
    let mut index = Index::default();
    index.apply(mk_service("default", "web", &[("", 80)]));
    index.apply(mk_slice(
        "default",
        "web-a",
        "web",
        &[("", 8080)],
        &[Addr("10.0.0.1", None)],
    ));
    let resolved = resolve(&index, "default", "web", BackendPort::Number(80))
        .expect("backend must resolve");
    assert_eq!(resolved.port, 8080);
}

/// The first slice that exposes the port name fixes the port number; slices
/// exposing the same name on another number are ignored rather than merged.
#[test]
fn first_matching_port_wins() {
    let mut index = Index::default();
    index.apply(mk_service("default", "web", &[("http", 80)]));
    index.apply(mk_slice(
        "default",
        "web-a",
        "web",
        &[("http", 8080)],
        &[Addr("10.0.0.1", Some(true))],
    ));
    index.apply(mk_slice(
        "default",
        "web-b",
        "web",
        &[("http", 9090)],
        &[Addr("10.0.0.2", Some(true))],
    ));

    let resolved = resolve(&index, "default", "web", BackendPort::Name("http"))
        .expect("backend must resolve");
    assert_eq!(resolved.port, 8080);
    assert_eq!(resolved.addresses, vec!["10.0.0.1"]);
}

#[test]
fn protocol_comes_from_matched_port() {
    let mut index = Index::default();
    index.apply(mk_service("default", "dns", &[("dns", 53)]));
    let mut slice = mk_slice(
        "default",
        "dns-a",
        "dns",
        &[("dns", 5353)],
        &[Addr("10.0.0.1", Some(true))],
    );
    if let Some(ports) = slice.ports.as_mut() {
        ports[0].protocol = Some("UDP".to_string());
    }
    index.apply(slice);

    let resolved = resolve(&index, "default", "dns", BackendPort::Number(53))
        .expect("backend must resolve");
    assert_eq!(resolved.protocol, "UDP");
}
