use argon_controller_core::{
    target::InvalidHeaderMode, AuthConfig, BackendPolicy, HeaderRewrite, LbAlgorithm,
};
use argon_controller_k8s_api::annotations;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to parse request headers: {0}")]
    InvalidHeaders(#[source] serde_yaml::Error),

    #[error("invalid request headers: {0}")]
    InvalidHeaderMode(#[from] InvalidHeaderMode),
}

#[derive(Debug, Deserialize)]
struct RawHeaderRewrite {
    name: String,
    mode: String,
    #[serde(default)]
    value: Option<String>,
}

/// Reads a resource's annotations into a backend policy.
///
/// Unparseable timeouts and unknown load-balancing algorithms fall back to
/// their defaults. A malformed header rewrite list rejects the whole policy.
pub fn parse(annotations: &BTreeMap<String, String>) -> Result<BackendPolicy, PolicyError> {
    let mut policy = BackendPolicy::default();

    if let Some(protocol) = annotations.get(annotations::BACKEND_PROTOCOL) {
        policy.backend_protocol = protocol.clone();
    }

    if let Some(timeout) = annotations.get(annotations::BACKEND_TIMEOUT) {
        match timeout.trim().parse() {
            Ok(ms) => policy.timeout_ms = ms,
            Err(error) => tracing::info!(
                %error,
                timeout,
                default = BackendPolicy::DEFAULT_TIMEOUT_MS,
                "Invalid backend timeout; using default"
            ),
        }
    }

    if let Some(lb) = annotations.get(annotations::LB_ALGORITHM) {
        match lb.trim().parse() {
            Ok(lb) => policy.lb_algorithm = lb,
            Err(()) => tracing::info!(
                lb_algorithm = %lb,
                default = %LbAlgorithm::default(),
                "Unsupported load balancing algorithm; using default"
            ),
        }
    }

    if let Some(raw) = annotations.get(annotations::REQUEST_HEADERS) {
        policy.request_headers = parse_request_headers(raw)?;
    }

    policy.auth = parse_auth(annotations);

    Ok(policy)
}

/// Parses a YAML (or JSON) list of `{name, mode, value}` header rewrites.
///
/// Modes are matched case-insensitively; any unsupported mode rejects the
/// whole list.
pub fn parse_request_headers(raw: &str) -> Result<Vec<HeaderRewrite>, PolicyError> {
    let entries = serde_yaml::from_str::<Option<Vec<RawHeaderRewrite>>>(raw)
        .map_err(PolicyError::InvalidHeaders)?
        .unwrap_or_default();
    entries
        .into_iter()
        .map(|RawHeaderRewrite { name, mode, value }| -> Result<_, PolicyError> {
            Ok(HeaderRewrite {
                name,
                mode: mode.parse()?,
                value,
            })
        })
        .collect()
}

fn parse_auth(annotations: &BTreeMap<String, String>) -> Option<AuthConfig> {
    let get = |key: &str| {
        annotations
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let url = get(annotations::AUTH_URL);
    let signin = get(annotations::AUTH_SIGNIN);
    let response_headers = get(annotations::AUTH_RESPONSE_HEADERS);
    let skip_paths = get(annotations::AUTH_SKIP_PATHS);
    let cookie_name = get(annotations::AUTH_COOKIE_NAME);

    if url.is_none()
        && signin.is_none()
        && response_headers.is_none()
        && skip_paths.is_none()
        && cookie_name.is_none()
    {
        return None;
    }

    Some(AuthConfig {
        url: url.map(Into::into),
        signin: signin.map(Into::into),
        response_headers: response_headers.map(parse_csv).unwrap_or_default(),
        skip_paths: skip_paths.map(parse_csv).unwrap_or_default(),
        cookie_name: cookie_name.map(Into::into),
    })
}

/// Splits a comma-separated list, dropping blanks and repeats while keeping
/// the first-seen order.
fn parse_csv(list: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    list.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty() && seen.insert(*v))
        .map(Into::into)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon_controller_core::HeaderMode;
    use maplit::btreemap;

    #[test]
    fn defaults() {
        let policy = parse(&BTreeMap::new()).expect("empty annotations must parse");
        assert_eq!(policy, BackendPolicy::default());
        assert_eq!(policy.backend_protocol, "h1");
        assert_eq!(policy.timeout_ms, 3000);
        assert_eq!(policy.retries, 1);
        assert_eq!(policy.lb_algorithm, LbAlgorithm::RoundRobin);
        assert!(policy.auth.is_none());
    }

    #[test]
    fn fallbacks() {
        let policy = parse(&btreemap! {
            annotations::BACKEND_TIMEOUT.to_string() => "soon".to_string(),
            annotations::LB_ALGORITHM.to_string() => "Random".to_string(),
            annotations::BACKEND_RETRIES.to_string() => "5".to_string(),
        })
        .expect("fallbacks must not fail");
        assert_eq!(policy.timeout_ms, 3000);
        assert_eq!(policy.lb_algorithm, LbAlgorithm::RoundRobin);
        assert_eq!(policy.retries, 1);
    }

    #[test]
    fn explicit_values() {
        let policy = parse(&btreemap! {
            annotations::BACKEND_PROTOCOL.to_string() => "h2".to_string(),
            annotations::BACKEND_TIMEOUT.to_string() => "1500".to_string(),
            annotations::LB_ALGORITHM.to_string() => "LeastConn".to_string(),
        })
        .expect("annotations must parse");
        assert_eq!(policy.backend_protocol, "h2");
        assert_eq!(policy.timeout_ms, 1500);
        assert_eq!(policy.lb_algorithm, LbAlgorithm::LeastConn);
    }

    #[test]
    fn header_modes_are_normalized() {
        let headers = parse_request_headers(
            r#"
- name: x-forwarded-proto
  mode: set
  value: https
- name: x-debug
  mode: REMOVE
"#,
        )
        .expect("headers must parse");
        assert_eq!(
            headers,
            vec![
                HeaderRewrite {
                    name: "x-forwarded-proto".to_string(),
                    mode: HeaderMode::Set,
                    value: Some("https".to_string()),
                },
                HeaderRewrite {
                    name: "x-debug".to_string(),
                    mode: HeaderMode::Remove,
                    value: None,
                },
            ]
        );
    }

    #[test]
    fn json_headers_are_accepted() {
        let headers =
            parse_request_headers(r#"[{"name":"x-env","mode":"Append","value":"prod"}]"#)
                .expect("headers must parse");
        assert_eq!(headers[0].mode, HeaderMode::Append);
    }

    #[test]
    fn unknown_header_mode_rejects_policy() {
        let annotations = btreemap! {
            annotations::REQUEST_HEADERS.to_string() => r#"
- name: x-ok
  mode: Set
  value: "1"
- name: x-bad
  mode: foo
"#.to_string(),
        };
        assert!(matches!(
            parse(&annotations),
            Err(PolicyError::InvalidHeaderMode(_))
        ));
    }

    #[test]
    fn malformed_headers_reject_policy() {
        assert!(matches!(
            parse_request_headers("name: not-a-list"),
            Err(PolicyError::InvalidHeaders(_))
        ));
    }

    #[test]
    fn auth_is_absent_when_blank() {
        let policy = parse(&btreemap! {
            annotations::AUTH_URL.to_string() => "  ".to_string(),
            annotations::AUTH_COOKIE_NAME.to_string() => "".to_string(),
        })
        .expect("annotations must parse");
        assert!(policy.auth.is_none());
    }

    #[test]
    fn auth_fields() {
        let policy = parse(&btreemap! {
            annotations::AUTH_URL.to_string() => "http://auth.default.svc/verify".to_string(),
            annotations::AUTH_RESPONSE_HEADERS.to_string() => "x-user, x-email,,x-user ".to_string(),
            annotations::AUTH_SKIP_PATHS.to_string() => "/healthz".to_string(),
        })
        .expect("annotations must parse");
        assert_eq!(
            policy.auth,
            Some(AuthConfig {
                url: Some("http://auth.default.svc/verify".to_string()),
                signin: None,
                response_headers: vec!["x-user".to_string(), "x-email".to_string()],
                skip_paths: vec!["/healthz".to_string()],
                cookie_name: None,
            })
        );
    }
}
