//! Configuration: schema, loading, validation and hot reload.

mod loader;
pub mod notify;
mod schema;
mod validation;

pub use loader::ConfigType;
pub use notify::{NotifyMode, NotifyPlugin};
pub use schema::{
    AppConfig, Config, ConfigSetItem, GroupConfig, MiddlewareConfig, OfflineConfig,
    RUN_MODE_DEVELOPMENT, RUN_MODE_PRODUCTION, RouterConfig, ServerConfig, SessionConfig,
};
pub use validation::{ValidationError, validate_config};
