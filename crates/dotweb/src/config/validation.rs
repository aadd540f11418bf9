//! Configuration validation.
//!
//! Serde covers the syntax; this checks the values. All problems are
//! reported at once so a broken file can be fixed in one pass.

use super::schema::{Config, MiddlewareConfig, RouterConfig};
use crate::session::{SESSION_MODE_REDIS, SESSION_MODE_RUNTIME};

const KNOWN_METHODS: [&str; 10] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "CONNECT", "TRACE", "ANY",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let session = &config.session;
    if session.session_mode != SESSION_MODE_RUNTIME && session.session_mode != SESSION_MODE_REDIS {
        errors.push(ValidationError::new(
            "session.sessionMode",
            format!("unknown mode '{}', expected runtime or redis", session.session_mode),
        ));
    }
    if session.enabled_session
        && session.session_mode == SESSION_MODE_REDIS
        && session.server_ip.is_empty()
    {
        errors.push(ValidationError::new(
            "session.serverIp",
            "redis session mode needs a server address",
        ));
    }

    if config.offline.offline
        && !config.offline.offline_url.is_empty()
        && !(config.offline.offline_url.starts_with('/')
            || config.offline.offline_url.starts_with("http://")
            || config.offline.offline_url.starts_with("https://"))
    {
        errors.push(ValidationError::new(
            "offline.offlineUrl",
            "must be an absolute path or an http(s) URL",
        ));
    }

    check_middlewares("middlewares", &config.middlewares, &mut errors);
    for (i, router) in config.routers.iter().enumerate() {
        check_router(&format!("routers[{i}]"), router, &mut errors);
    }
    for (i, group) in config.groups.iter().enumerate() {
        let field = format!("groups[{i}]");
        if !group.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{field}.path"),
                "must begin with '/'",
            ));
        }
        check_middlewares(&format!("{field}.middlewares"), &group.middlewares, &mut errors);
        for (j, router) in group.routers.iter().enumerate() {
            check_router(&format!("{field}.routers[{j}]"), router, &mut errors);
        }
    }

    for (i, item) in config.config_set.iter().enumerate() {
        if item.key.is_empty() {
            errors.push(ValidationError::new(format!("configSet[{i}].key"), "must not be empty"));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_middlewares(field: &str, middlewares: &[MiddlewareConfig], errors: &mut Vec<ValidationError>) {
    for (i, m) in middlewares.iter().enumerate() {
        if m.name.is_empty() {
            errors.push(ValidationError::new(format!("{field}[{i}].name"), "must not be empty"));
        }
    }
}

fn check_router(field: &str, router: &RouterConfig, errors: &mut Vec<ValidationError>) {
    if !KNOWN_METHODS
        .iter()
        .any(|m| router.method.eq_ignore_ascii_case(m))
    {
        errors.push(ValidationError::new(
            format!("{field}.method"),
            format!("invalid method '{}'", router.method),
        ));
    }
    if !router.path.starts_with('/') {
        errors.push(ValidationError::new(format!("{field}.path"), "must begin with '/'"));
    }
    if router.handler.is_empty() {
        errors.push(ValidationError::new(format!("{field}.handler"), "must not be empty"));
    }
    check_middlewares(&format!("{field}.middlewares"), &router.middlewares, errors);
}
