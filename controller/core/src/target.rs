use crate::tls::TlsBundle;
use serde::{Serialize, Serializer};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// One routing intent: a host and the backends serving each of its paths.
///
/// Targets are built fresh by every synthesis pass and are not modified once
/// they have been handed to the synthesizer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Target {
    pub host: String,
    pub paths: BTreeMap<String, TargetEndpoint>,
    pub tls: Option<TlsBundle>,
}

/// The resolved backend for a single host and path.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetEndpoint {
    pub port: u16,
    /// Transport protocol declared on the matched endpoint port (e.g. `TCP`).
    pub protocol: String,
    /// Sorted and deduplicated; never empty.
    pub addresses: Vec<String>,
    pub path_match: PathMatch,
    pub policy: BackendPolicy,
}

/// Backend behavior configured through resource annotations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendPolicy {
    pub backend_protocol: String,
    pub timeout_ms: u32,
    pub retries: u32,
    pub lb_algorithm: LbAlgorithm,
    pub request_headers: Vec<HeaderRewrite>,
    pub auth: Option<AuthConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathMatch {
    Exact,
    Prefix,
    ImplementationSpecific,
    /// A match kind this controller does not interpret. It is carried through
    /// verbatim and ranks below every known kind.
    Other(String),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LbAlgorithm {
    #[default]
    RoundRobin,
    LeastConn,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct HeaderRewrite {
    pub name: String,
    pub mode: HeaderMode,
    pub value: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HeaderMode {
    Set,
    Append,
    Remove,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AuthConfig {
    pub url: Option<String>,
    pub signin: Option<String>,
    pub response_headers: Vec<String>,
    pub skip_paths: Vec<String>,
    pub cookie_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported header rewrite mode {0:?}; expected Set, Append, or Remove")]
pub struct InvalidHeaderMode(pub String);

// === impl BackendPolicy ===

impl BackendPolicy {
    pub const DEFAULT_BACKEND_PROTOCOL: &'static str = "h1";
    pub const DEFAULT_TIMEOUT_MS: u32 = 3000;
    pub const DEFAULT_RETRIES: u32 = 1;
}

impl Default for BackendPolicy {
    fn default() -> Self {
        Self {
            backend_protocol: Self::DEFAULT_BACKEND_PROTOCOL.to_string(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            retries: Self::DEFAULT_RETRIES,
            lb_algorithm: LbAlgorithm::default(),
            request_headers: Vec::new(),
            auth: None,
        }
    }
}

// === impl PathMatch ===

impl PathMatch {
    /// Orders match kinds by specificity. Higher ranks are preferred.
    pub fn rank(&self) -> u32 {
        match self {
            Self::Exact => 3,
            Self::Prefix => 2,
            Self::ImplementationSpecific => 1,
            Self::Other(_) => 0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact => "Exact",
            Self::Prefix => "Prefix",
            Self::ImplementationSpecific => "ImplementationSpecific",
            Self::Other(kind) => kind,
        }
    }
}

impl From<&str> for PathMatch {
    fn from(kind: &str) -> Self {
        match kind {
            "Exact" => Self::Exact,
            "Prefix" => Self::Prefix,
            "ImplementationSpecific" => Self::ImplementationSpecific,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PathMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PathMatch {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

// === impl LbAlgorithm ===

impl LbAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "RoundRobin",
            Self::LeastConn => "LeastConn",
        }
    }
}

impl FromStr for LbAlgorithm {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RoundRobin" => Ok(Self::RoundRobin),
            "LeastConn" => Ok(Self::LeastConn),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LbAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LbAlgorithm {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

// === impl HeaderMode ===

impl HeaderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "Set",
            Self::Append => "Append",
            Self::Remove => "Remove",
        }
    }
}

impl FromStr for HeaderMode {
    type Err = InvalidHeaderMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = s.trim();
        if mode.eq_ignore_ascii_case("set") {
            Ok(Self::Set)
        } else if mode.eq_ignore_ascii_case("append") {
            Ok(Self::Append)
        } else if mode.eq_ignore_ascii_case("remove") {
            Ok(Self::Remove)
        } else {
            Err(InvalidHeaderMode(s.to_string()))
        }
    }
}

impl fmt::Display for HeaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
