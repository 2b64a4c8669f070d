use super::*;
use crate::{
    gateway::{addresses, GatewayAddress, GatewayError, GatewaySource},
    TargetSource,
};
use argon_controller_core::PathMatch;
use gateway::HTTPRouteRulesMatchesPathType as PathType;

fn gateway_index() -> Index {
    let mut index = web_index();
    index.apply(mk_tls_secret("default", "app-tls", "app.example.com"));
    index
}

#[test]
fn attached_routes_become_targets() {
    let index = gateway_index();
    let gw = mk_gateway(
        "default",
        "public",
        vec![
            mk_listener("http", None, None),
            mk_listener("https", Some("app.example.com"), Some(vec![cert_ref("app-tls")])),
        ],
        vec![("IPAddress", "192.0.2.10")],
    );
    let routes = [
        mk_route(
            "default",
            "app",
            "public",
            Some(vec!["app.example.com"]),
            vec![
                (vec![(PathType::PathPrefix, "/api")], "web", 80),
                (vec![(PathType::Exact, "/healthz")], "web", 80),
            ],
        ),
        mk_route(
            "default",
            "elsewhere",
            "private",
            Some(vec!["other.example.com"]),
            vec![(vec![(PathType::PathPrefix, "/")], "web", 80)],
        ),
    ];

    let source = GatewaySource::new(&gw, routes.iter());
    assert_eq!(source.routes().len(), 1);
    assert_eq!(source.source_key(), "gw:default/public");

    let targets = source
        .extract_targets(&index)
        .expect("gateway must compile");
    assert_eq!(targets.len(), 1);
    let target = &targets[0];
    assert_eq!(target.host, "app.example.com");
    assert_eq!(target.paths["/api"].path_match, PathMatch::Prefix);
    assert_eq!(target.paths["/healthz"].path_match, PathMatch::Exact);
    assert_eq!(target.paths["/api"].addresses, vec!["10.0.0.1", "10.0.0.2"]);

    let tls = target.tls.as_ref().expect("https listener must attach a bundle");
    assert_eq!(tls.name, "default/app-tls");
    assert_eq!(tls.sni, vec!["app.example.com"]);
}

#[test]
fn routes_without_hostnames_use_listener_hostnames() {
    let index = gateway_index();
    let gw = mk_gateway(
        "default",
        "public",
        vec![mk_listener("http", Some("*.example.com"), None)],
        vec![("IPAddress", "192.0.2.10")],
    );
    let route = mk_route(
        "default",
        "app",
        "public",
        None,
        vec![(vec![(PathType::RegularExpression, "/v[0-9]+")], "web", 80)],
    );

    let targets = GatewaySource::new(&gw, [&route])
        .extract_targets(&index)
        .expect("gateway must compile");
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].host, "*.example.com");
    assert_eq!(
        targets[0].paths["/v[0-9]+"].path_match,
        PathMatch::Other("RegularExpression".to_string())
    );
}

#[test]
fn section_name_selects_listener() {
    let index = gateway_index();
    let gw = mk_gateway(
        "default",
        "public",
        vec![
            mk_listener("http", Some("app.example.com"), None),
            mk_listener("https", Some("app.example.com"), Some(vec![cert_ref("app-tls")])),
        ],
        vec![("IPAddress", "192.0.2.10")],
    );
    let mut route = mk_route(
        "default",
        "app",
        "public",
        None,
        vec![(vec![(PathType::PathPrefix, "/")], "web", 80)],
    );
    if let Some(parents) = route.spec.parent_refs.as_mut() {
        parents[0].section_name = Some("http".to_string());
    }

    let targets = GatewaySource::new(&gw, [&route])
        .extract_targets(&index)
        .expect("gateway must compile");
    assert_eq!(targets.len(), 1);
    assert!(targets[0].tls.is_none(), "only the http listener is attached");

    if let Some(parents) = route.spec.parent_refs.as_mut() {
        parents[0].section_name = Some("grpc".to_string());
    }
    assert!(GatewaySource::new(&gw, [&route]).routes().is_empty());
}

#[test]
fn missing_certificate_fails_gateway() {
    let index = gateway_index();
    let gw = mk_gateway(
        "default",
        "public",
        vec![mk_listener(
            "https",
            Some("app.example.com"),
            Some(vec![cert_ref("app-tls"), cert_ref("missing")]),
        )],
        vec![("IPAddress", "192.0.2.10")],
    );
    let error = GatewaySource::new(&gw, [])
        .extract_targets(&index)
        .expect_err("certificate failures must propagate");
    assert!(matches!(
        error.downcast_ref::<GatewayError>(),
        Some(GatewayError::Certificate { .. })
    ));
}

#[test]
fn unsupported_certificate_refs_fail_gateway() {
    let index = gateway_index();
    let mut cert = cert_ref("app-tls");
    cert.kind = Some("ConfigMap".to_string());
    let gw = mk_gateway(
        "default",
        "public",
        vec![mk_listener("https", None, Some(vec![cert]))],
        vec![("IPAddress", "192.0.2.10")],
    );
    let error = GatewaySource::new(&gw, [])
        .extract_targets(&index)
        .expect_err("unsupported kinds must fail");
    assert!(matches!(
        error.downcast_ref::<GatewayError>(),
        Some(GatewayError::UnsupportedCertificateKind { .. })
    ));

    let mut cert = cert_ref("app-tls");
    cert.group = Some("example.com".to_string());
    let gw = mk_gateway(
        "default",
        "public",
        vec![mk_listener("https", None, Some(vec![cert]))],
        vec![("IPAddress", "192.0.2.10")],
    );
    let error = GatewaySource::new(&gw, [])
        .extract_targets(&index)
        .expect_err("unsupported groups must fail");
    assert!(matches!(
        error.downcast_ref::<GatewayError>(),
        Some(GatewayError::UnsupportedCertificateGroup { .. })
    ));
}

#[test]
fn passthrough_listeners_are_not_terminated() {
    let index = gateway_index();
    let mut listener = mk_listener("tls", None, Some(vec![cert_ref("missing")]));
    if let Some(tls) = listener.tls.as_mut() {
        tls.mode = Some(gateway::GatewayListenersTlsMode::Passthrough);
    }
    let gw = mk_gateway("default", "public", vec![listener], vec![("IPAddress", "192.0.2.10")]);
    assert!(GatewaySource::new(&gw, []).extract_targets(&index).is_ok());
}

#[test]
fn gateway_without_listeners_fails() {
    let index = gateway_index();
    let gw = mk_gateway("default", "public", vec![], vec![("IPAddress", "192.0.2.10")]);
    let error = GatewaySource::new(&gw, [])
        .extract_targets(&index)
        .expect_err("listeners are required");
    assert!(matches!(
        error.downcast_ref::<GatewayError>(),
        Some(GatewayError::NoListeners(_))
    ));
}

#[test]
fn gateway_addresses() {
    let gw = mk_gateway(
        "default",
        "public",
        vec![],
        vec![
            ("IPAddress", "192.0.2.10"),
            ("Hostname", "lb.example.com"),
            ("NamedAddress", "public-lb"),
        ],
    );
    assert_eq!(
        addresses(&gw).expect("addresses must parse"),
        vec![
            GatewayAddress::Ip([192, 0, 2, 10].into()),
            GatewayAddress::Named("lb.example.com".to_string()),
            GatewayAddress::Named("public-lb".to_string()),
        ]
    );

    let gw = mk_gateway("default", "public", vec![], vec![("IPAddress", "lb.example.com")]);
    assert!(matches!(addresses(&gw), Err(GatewayError::InvalidAddress(_))));

    let gw = mk_gateway("default", "public", vec![], vec![("Custom", "x")]);
    assert!(matches!(
        addresses(&gw),
        Err(GatewayError::UnsupportedAddressType(_))
    ));

    let gw = mk_gateway("default", "public", vec![], vec![]);
    assert!(matches!(addresses(&gw), Err(GatewayError::NoAddresses(_))));
}
