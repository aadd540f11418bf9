//! Configuration loading from disk.
//!
//! JSON and YAML map one-to-one onto [`Config`]. XML wraps lists in a
//! container element (`<routers><router>...</router></routers>`), so it is
//! read into mirror types first and converted.

use std::path::Path;

use serde::Deserialize;

use super::schema::{
    AppConfig, Config, ConfigSetItem, GroupConfig, MiddlewareConfig, OfflineConfig, RouterConfig,
    ServerConfig, SessionConfig,
};
use super::validation::validate_config;
use crate::error::{DotwebError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigType {
    Xml,
    Json,
    Yaml,
}

impl ConfigType {
    /// Guess the format from the file extension.
    pub fn from_path(path: &Path) -> Option<ConfigType> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xml" => Some(ConfigType::Xml),
            "json" => Some(ConfigType::Json),
            "yaml" | "yml" => Some(ConfigType::Yaml),
            _ => None,
        }
    }
}

impl Config {
    /// Parse and validate `content`.
    pub fn parse(content: &str, kind: ConfigType) -> Result<Config> {
        let config = match kind {
            ConfigType::Json => serde_json::from_str(content)
                .map_err(|e| DotwebError::ConfigParse(format!("json: {e}")))?,
            ConfigType::Yaml => serde_yaml::from_str(content)
                .map_err(|e| DotwebError::ConfigParse(format!("yaml: {e}")))?,
            ConfigType::Xml => quick_xml::de::from_str::<XmlConfig>(content)
                .map_err(|e| DotwebError::ConfigParse(format!("xml: {e}")))?
                .into(),
        };
        validate_config(&config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            DotwebError::ConfigParse(format!("validation failed: {joined}"))
        })?;
        Ok(config)
    }

    /// Read, parse and validate the file at `path`.
    pub fn from_file(path: impl AsRef<Path>, kind: ConfigType) -> Result<Config> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DotwebError::ConfigParse(format!("cannot read {}: {e}", path.display()))
        })?;
        Config::parse(&content, kind)
    }

    /// Like [`from_file`](Self::from_file), picking the format from the
    /// file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let kind = ConfigType::from_path(path).ok_or_else(|| {
            DotwebError::ConfigParse(format!("unknown config format for {}", path.display()))
        })?;
        Config::from_file(path, kind)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct XmlConfig {
    app: AppConfig,
    offline: OfflineConfig,
    server: ServerConfig,
    session: SessionConfig,
    middlewares: XmlMiddlewares,
    routers: XmlRouters,
    groups: XmlGroups,
    config_set: XmlConfigSet,
}

#[derive(Debug, Default, Deserialize)]
struct XmlMiddlewares {
    #[serde(rename = "middleware", default)]
    items: Vec<MiddlewareConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct XmlRouters {
    #[serde(rename = "router", default)]
    items: Vec<XmlRouter>,
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct XmlRouter {
    method: String,
    path: String,
    handler: String,
    middlewares: XmlMiddlewares,
    is_use: bool,
}

impl Default for XmlRouter {
    fn default() -> Self {
        let defaults = RouterConfig::default();
        XmlRouter {
            method: defaults.method,
            path: defaults.path,
            handler: defaults.handler,
            middlewares: XmlMiddlewares::default(),
            is_use: defaults.is_use,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct XmlGroups {
    #[serde(rename = "group", default)]
    items: Vec<XmlGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct XmlGroup {
    path: String,
    middlewares: XmlMiddlewares,
    routers: XmlRouters,
    is_use: bool,
}

impl Default for XmlGroup {
    fn default() -> Self {
        XmlGroup {
            path: String::new(),
            middlewares: XmlMiddlewares::default(),
            routers: XmlRouters::default(),
            is_use: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct XmlConfigSet {
    #[serde(rename = "set", default)]
    items: Vec<ConfigSetItem>,
}

impl From<XmlRouter> for RouterConfig {
    fn from(r: XmlRouter) -> Self {
        RouterConfig {
            method: r.method,
            path: r.path,
            handler: r.handler,
            middlewares: r.middlewares.items,
            is_use: r.is_use,
        }
    }
}

impl From<XmlGroup> for GroupConfig {
    fn from(g: XmlGroup) -> Self {
        GroupConfig {
            path: g.path,
            middlewares: g.middlewares.items,
            routers: g.routers.items.into_iter().map(Into::into).collect(),
            is_use: g.is_use,
        }
    }
}

impl From<XmlConfig> for Config {
    fn from(x: XmlConfig) -> Self {
        Config {
            app: x.app,
            offline: x.offline,
            server: x.server,
            session: x.session,
            middlewares: x.middlewares.items,
            routers: x.routers.items.into_iter().map(Into::into).collect(),
            groups: x.groups.items.into_iter().map(Into::into).collect(),
            config_set: x.config_set.items,
        }
    }
}
