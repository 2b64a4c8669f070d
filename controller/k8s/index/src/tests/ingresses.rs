use super::*;
use crate::TargetSource;
use argon_controller_core::{HeaderMode, PathMatch};
use argon_controller_k8s_api::annotations;

fn web_path<'a>(path: &'a str, path_type: &'a str) -> IngPath<'a> {
    IngPath {
        path,
        path_type,
        service: "web",
        port: port_number(80),
    }
}

#[test]
fn rules_become_targets() {
    let index = web_index();
    let ingress = mk_ingress(
        "default",
        "app",
        btreemap! {
            annotations::BACKEND_TIMEOUT.to_string() => "1200".to_string(),
        },
        vec![(
            "app.example.com",
            vec![web_path("/api", "Prefix"), web_path("/api/v1", "Exact")],
        )],
        vec![],
    );

    let targets = ingress
        .extract_targets(&index)
        .expect("ingress must compile");
    assert_eq!(targets.len(), 1);
    let target = &targets[0];
    assert_eq!(target.host, "app.example.com");
    assert!(target.tls.is_none());

    let api = &target.paths["/api"];
    assert_eq!(api.path_match, PathMatch::Prefix);
    assert_eq!(api.port, 8080);
    assert_eq!(api.addresses, vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(api.policy.timeout_ms, 1200);
    assert_eq!(target.paths["/api/v1"].path_match, PathMatch::Exact);
}

#[test]
fn unresolvable_paths_are_dropped() {
    let mut index = web_index();
    index.apply(mk_service("default", "idle", &[("http", 80)]));
    index.apply(mk_slice(
        "default",
        "idle-a",
        "idle",
        &[("http", 8080)],
        &[Addr("10.1.0.1", Some(false))],
    ));

    let ingress = mk_ingress(
        "default",
        "app",
        BTreeMap::new(),
        vec![
            (
                "app.example.com",
                vec![
                    web_path("/", "Prefix"),
                    IngPath {
                        path: "/idle",
                        path_type: "Prefix",
                        service: "idle",
                        port: port_number(80),
                    },
                    IngPath {
                        path: "/missing",
                        path_type: "Prefix",
                        service: "missing",
                        port: port_number(80),
                    },
                ],
            ),
            (
                "idle.example.com",
                vec![IngPath {
                    path: "/",
                    path_type: "Prefix",
                    service: "idle",
                    port: port_name("http"),
                }],
            ),
        ],
        vec![],
    );

    let targets = ingress
        .extract_targets(&index)
        .expect("ingress must compile");
    assert_eq!(targets.len(), 1, "a rule without viable paths is dropped");
    assert_eq!(targets[0].paths.keys().collect::<Vec<_>>(), vec!["/"]);
}

#[test]
fn invalid_header_mode_abandons_ingress() {
    let index = web_index();
    let ingress = mk_ingress(
        "default",
        "app",
        btreemap! {
            annotations::REQUEST_HEADERS.to_string() => "- name: x-a\n  mode: foo\n".to_string(),
        },
        vec![("app.example.com", vec![web_path("/", "Prefix")])],
        vec![],
    );
    assert!(ingress.extract_targets(&index).is_err());

    let ingress = mk_ingress(
        "default",
        "app",
        btreemap! {
            annotations::REQUEST_HEADERS.to_string() => "- name: x-a\n  mode: set\n  value: b\n".to_string(),
        },
        vec![("app.example.com", vec![web_path("/", "Prefix")])],
        vec![],
    );
    let targets = ingress
        .extract_targets(&index)
        .expect("ingress must compile");
    assert_eq!(
        targets[0].paths["/"].policy.request_headers[0].mode,
        HeaderMode::Set
    );
}

#[test]
fn last_built_tls_bundle_wins() {
    let mut index = web_index();
    index.apply(mk_tls_secret("default", "first", "app.example.com"));
    index.apply(mk_tls_secret("default", "second", "app.example.com"));
    let mut broken = mk_tls_secret("default", "broken", "app.example.com");
    broken.data = Some(btreemap! {
        k8s::TLS_CERT_KEY.to_string() => ByteString(b"garbage".to_vec()),
        k8s::TLS_KEY_KEY.to_string() => ByteString(b"garbage".to_vec()),
    });
    index.apply(broken);

    let ingress = mk_ingress(
        "default",
        "app",
        BTreeMap::new(),
        vec![
            ("app.example.com", vec![web_path("/", "Prefix")]),
            ("www.example.com", vec![web_path("/", "Prefix")]),
        ],
        vec![
            ("first", vec!["app.example.com"]),
            ("second", vec!["app.example.com"]),
            // Failures and incomplete entries do not displace an earlier bundle.
            ("broken", vec!["app.example.com"]),
            ("missing", vec!["app.example.com"]),
            ("first", vec![]),
        ],
    );

    let targets = ingress
        .extract_targets(&index)
        .expect("ingress must compile");
    assert_eq!(targets.len(), 2);
    for target in &targets {
        let tls = target.tls.as_ref().expect("target must carry a bundle");
        assert_eq!(tls.name, "default/second");
        assert_eq!(tls.sni, vec!["app.example.com"]);
    }
}

#[test]
fn source_identity() {
    let ingress = mk_ingress("default", "app", BTreeMap::new(), vec![], vec![]);
    assert_eq!(ingress.source_key(), "ing:default/app");
    assert_eq!(ingress.source_version().as_deref(), Some("1"));
    assert!(crate::ingress::matches_class(&ingress, "argon"));
    assert!(!crate::ingress::matches_class(&ingress, "nginx"));
}
