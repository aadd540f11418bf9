use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dotweb::context::MiddlewareTier;
use dotweb::middleware::{HANDLE_DURATION_KEY, TimeoutHook, from_fn};
use dotweb::testing::{call, request};
use dotweb::{HttpContext, HttpServer, Layer, Middleware, Next, Result};
use hyper::http::{Method, StatusCode};
use parking_lot::Mutex;

type Journal = Arc<Mutex<Vec<String>>>;

/// Records entry and exit around the rest of the pipeline.
struct Trace {
    name: &'static str,
    journal: Journal,
}

#[async_trait]
impl Middleware for Trace {
    async fn handle(&self, ctx: &mut HttpContext, next: Next<'_>) -> Result<()> {
        self.journal
            .lock()
            .push(format!("{}-in:{:?}", self.name, ctx.tier()));
        let result = next.run(ctx).await;
        self.journal.lock().push(format!("{}-out", self.name));
        result
    }
}

fn trace(name: &'static str, journal: &Journal) -> Trace {
    Trace {
        name,
        journal: journal.clone(),
    }
}

/// Ends the request without calling the rest of the chain.
struct Deny;

#[async_trait]
impl Middleware for Deny {
    async fn handle(&self, ctx: &mut HttpContext, next: Next<'_>) -> Result<()> {
        ctx.write_string_c(StatusCode::FORBIDDEN, "denied")?;
        ctx.end();
        next.run(ctx).await
    }
}

fn register_handler(server: &mut HttpServer, path: &str, journal: &Journal) -> dotweb::RouteNode {
    let journal = journal.clone();
    server.get(path, move |ctx| {
        let journal = journal.clone();
        Box::pin(async move {
            journal.lock().push(format!("H:{:?}", ctx.tier()));
            ctx.write_string("done")?;
            Ok(())
        })
    })
}

#[tokio::test]
async fn test_tiers_run_in_order_and_unwind_in_reverse() {
    let journal: Journal = Arc::default();
    let mut server = HttpServer::new();
    server.use_middleware(trace("A", &journal));
    {
        let mut group = server.group("/g");
        group.use_middleware(trace("B", &journal));
        let journal_h = journal.clone();
        group
            .get("/x", move |ctx| {
                let journal = journal_h.clone();
                Box::pin(async move {
                    journal.lock().push(format!("H:{:?}", ctx.tier()));
                    ctx.write_string("done")?;
                    Ok(())
                })
            })
            .use_middleware(trace("C", &journal));
    }
    let server = server.start().await.unwrap();

    let res = call(&server, request(Method::GET, "/g/x")).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body, "done");
    assert_eq!(
        *journal.lock(),
        vec![
            "A-in:App",
            "B-in:Group",
            "C-in:Route",
            "H:Handler",
            "C-out",
            "B-out",
            "A-out"
        ]
    );
}

#[tokio::test]
async fn test_excluded_route_skips_the_layer() {
    let journal: Journal = Arc::default();
    let mut server = HttpServer::new();
    server.use_middleware(Layer::new(trace("A", &journal)).exclude(["/public/:name"]));
    register_handler(&mut server, "/public/:name", &journal);
    register_handler(&mut server, "/private", &journal);
    let server = server.start().await.unwrap();

    call(&server, request(Method::GET, "/public/logo")).await;
    assert_eq!(*journal.lock(), vec!["H:Handler"]);

    journal.lock().clear();
    call(&server, request(Method::GET, "/private")).await;
    assert_eq!(*journal.lock(), vec!["A-in:App", "H:Handler", "A-out"]);
}

#[test]
fn test_layer_exclusion_queries() {
    let layer = Layer::new(Deny);
    assert!(!layer.has_exclude());
    let layer = layer.exclude(["/a", "/b/:id"]);
    assert!(layer.has_exclude());
    assert!(layer.exists_exclude("/b/:id"));
    assert!(!layer.exists_exclude("/b/1"));
}

#[tokio::test]
async fn test_end_stops_the_chain() {
    let journal: Journal = Arc::default();
    let mut server = HttpServer::new();
    server.use_middleware(trace("A", &journal));
    server.use_middleware(Deny);
    server.use_middleware(trace("B", &journal));
    register_handler(&mut server, "/secret", &journal);
    let server = server.start().await.unwrap();

    let res = call(&server, request(Method::GET, "/secret")).await;
    assert_eq!(res.status, 403);
    assert_eq!(res.body, "denied");
    assert_eq!(*journal.lock(), vec!["A-in:App", "A-out"]);
}

#[tokio::test]
async fn test_group_middleware_added_later_still_applies() {
    let journal: Journal = Arc::default();
    let mut server = HttpServer::new();
    {
        let mut group = server.group("/late");
        let journal_h = journal.clone();
        group.get("/x", move |ctx| {
            let journal = journal_h.clone();
            Box::pin(async move {
                journal.lock().push("H".to_string());
                ctx.write_string("ok")?;
                Ok(())
            })
        });
        group.use_middleware(trace("G", &journal));
    }
    let server = server.start().await.unwrap();

    call(&server, request(Method::GET, "/late/x")).await;
    assert_eq!(*journal.lock(), vec!["G-in:Group", "H", "G-out"]);
}

#[tokio::test]
async fn test_from_fn_can_rewrite_the_response() {
    let mut server = HttpServer::new();
    server.use_middleware(from_fn(|ctx, next| {
        Box::pin(async move {
            ctx.response_mut().set_header("x-powered-by", "dotweb")?;
            next.run(ctx).await
        })
    }));
    server.get("/", |ctx| {
        Box::pin(async move {
            ctx.write_string("index")?;
            Ok(())
        })
    });
    let server = server.start().await.unwrap();

    let res = call(&server, request(Method::GET, "/")).await;
    assert_eq!(res.header("x-powered-by"), "dotweb");
    assert_eq!(res.body, "index");
}

#[tokio::test]
async fn test_handler_error_propagates_through_middleware() {
    let journal: Journal = Arc::default();
    let mut server = HttpServer::new();
    server.use_middleware(trace("A", &journal));
    server.get("/fail", |_ctx| {
        Box::pin(async move { Err(dotweb::DotwebError::Internal("broken".into())) })
    });
    let server = server.start().await.unwrap();

    let res = call(&server, request(Method::GET, "/fail")).await;
    assert_eq!(res.status, 500);
    assert!(res.body.contains("broken"));
    assert_eq!(*journal.lock(), vec!["A-in:App", "A-out"]);
    assert_eq!(server.state().total_errors(), 1);
}

#[tokio::test]
async fn test_timeout_hook_fires_for_slow_handlers() {
    let fired: Arc<Mutex<Option<Duration>>> = Arc::default();
    let hook_fired = fired.clone();
    let mut server = HttpServer::new();
    server.use_middleware(TimeoutHook::new(Duration::from_millis(20), move |ctx| {
        let fired = hook_fired.clone();
        Box::pin(async move {
            *fired.lock() = ctx.items().get::<Duration>(HANDLE_DURATION_KEY);
            Ok(())
        })
    }));
    server.get("/slow", |ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ctx.write_string("slow")?;
            Ok(())
        })
    });
    server.get("/fast", |ctx| {
        Box::pin(async move {
            ctx.write_string("fast")?;
            Ok(())
        })
    });
    let server = server.start().await.unwrap();

    call(&server, request(Method::GET, "/fast")).await;
    assert!(fired.lock().is_none());

    let res = call(&server, request(Method::GET, "/slow")).await;
    assert_eq!(res.body, "slow");
    let measured = fired.lock().expect("hook should have run");
    assert!(measured >= Duration::from_millis(20));
}

#[test]
fn test_tier_defaults_to_app() {
    let ctx = HttpContext::default();
    assert_eq!(ctx.tier(), MiddlewareTier::App);
}
