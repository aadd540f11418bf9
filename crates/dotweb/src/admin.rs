//! Built-in `/dotweb/...` routes exposing server internals.

use hyper::http::StatusCode;

use crate::config::Config;
use crate::context::HttpContext;
use crate::error::Result;
use crate::router::Router;
use crate::state::ServerState;

pub const ADMIN_PREFIX: &str = "/dotweb";

/// Stand-in for values the config dump must not reveal.
pub const REDACTED: &str = "******";

pub(crate) fn register(router: &mut Router) {
    let mut group = router.group(ADMIN_PREFIX);
    group.get("/debug/pprof/:key", |ctx| Box::pin(pprof(ctx)));
    group.get("/debug/freemem", |ctx| Box::pin(freemem(ctx)));
    group.get("/state", |ctx| Box::pin(state_page(ctx)));
    group.get("/state/interval", |ctx| Box::pin(state_interval(ctx)));
    group.get("/query/:key", |ctx| Box::pin(query(ctx)));
    group.get("/routers", |ctx| Box::pin(routers(ctx)));
}

fn not_available(ctx: &mut HttpContext) -> Result<()> {
    ctx.write_string_c(StatusCode::SERVICE_UNAVAILABLE, "server not available")?;
    Ok(())
}

async fn pprof(ctx: &mut HttpContext) -> Result<()> {
    let Some(server) = ctx.server().cloned() else {
        return not_available(ctx);
    };
    match ctx.param("key") {
        "runtime" => {
            let metrics = tokio::runtime::Handle::current().metrics();
            let body = serde_json::json!({
                "version": crate::VERSION,
                "pid": std::process::id(),
                "uptime_secs": (chrono::Local::now() - server.state().started_at()).num_seconds(),
                "workers": metrics.num_workers(),
            });
            ctx.write_json(&body)?;
        }
        "pools" => {
            ctx.write_json(&server.pools().stats())?;
        }
        "state" => {
            ctx.write_json(&server.state().snapshot())?;
        }
        other => {
            let message = format!("unsupported pprof key '{other}'");
            ctx.write_string_c(StatusCode::NOT_FOUND, message)?;
        }
    }
    Ok(())
}

async fn freemem(ctx: &mut HttpContext) -> Result<()> {
    let Some(server) = ctx.server().cloned() else {
        return not_available(ctx);
    };
    let freed = server.pools().clear();
    tracing::info!(freed, "released pooled objects");
    ctx.write_string(format!("released {freed} pooled objects"))?;
    Ok(())
}

async fn state_page(ctx: &mut HttpContext) -> Result<()> {
    let Some(server) = ctx.server().cloned() else {
        return not_available(ctx);
    };
    ctx.write_html(server.state().show_html())?;
    Ok(())
}

async fn state_interval(ctx: &mut HttpContext) -> Result<()> {
    let Some(server) = ctx.server().cloned() else {
        return not_available(ctx);
    };
    let mut key = ctx.query_string("querykey");
    if key.is_empty() {
        key = ServerState::interval_key(chrono::Local::now());
    }
    let count = server.state().query_interval_count(&key);
    ctx.write_json(&serde_json::json!({ "key": key, "count": count }))?;
    Ok(())
}

/// Copy of `config` without the session store address and the free-form
/// settings, either of which may carry credentials.
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if !config.session.server_ip.is_empty() {
        config.session.server_ip = REDACTED.to_string();
    }
    for item in &mut config.config_set {
        item.value = REDACTED.to_string();
    }
    config
}

async fn query(ctx: &mut HttpContext) -> Result<()> {
    let Some(server) = ctx.server().cloned() else {
        return not_available(ctx);
    };
    match ctx.param("key") {
        "state" => {
            ctx.write_json(&server.state().snapshot())?;
        }
        "config" => {
            ctx.write_json(&redacted(&server.config()))?;
        }
        "session" => {
            let count = match server.session_manager() {
                Some(manager) => manager.store().session_count().await?,
                None => 0,
            };
            ctx.write_json(&serde_json::json!({ "sessions": count }))?;
        }
        other => {
            ctx.write_string(format!("query key '{other}' is not supported yet"))?;
        }
    }
    Ok(())
}

async fn routers(ctx: &mut HttpContext) -> Result<()> {
    let Some(server) = ctx.server().cloned() else {
        return not_available(ctx);
    };
    let routes = server.router().routes();
    let width = routes.iter().map(|r| r.method.len()).max().unwrap_or(0);
    let mut table = String::new();
    for route in routes {
        table.push_str(&format!("{:<width$} {}\n", route.method, route.path));
    }
    ctx.write_string(table)?;
    Ok(())
}
