//! Annotation keys recognized on ingresses and routes.

pub const BACKEND_PROTOCOL: &str = "argon.github.io/backend-protocol";
pub const BACKEND_TIMEOUT: &str = "argon.github.io/backend-timeout";
pub const BACKEND_RETRIES: &str = "argon.github.io/backend-retries";
pub const LB_ALGORITHM: &str = "argon.github.io/lb-algorithm";
pub const REQUEST_HEADERS: &str = "argon.github.io/request-headers";

pub const AUTH_URL: &str = "argon.github.io/auth-url";
pub const AUTH_SIGNIN: &str = "argon.github.io/auth-signin";
pub const AUTH_RESPONSE_HEADERS: &str = "argon.github.io/auth-response-headers";
pub const AUTH_SKIP_PATHS: &str = "argon.github.io/auth-skip-paths";
pub const AUTH_COOKIE_NAME: &str = "argon.github.io/auth-cookie-name";
