use std::sync::Arc;

use dotweb::config::Config;
use dotweb::router::{Node, Params, Router};
use dotweb::testing::{call, request};
use dotweb::{DotwebError, HttpContext, HttpServer, Result};
use futures_util::future::BoxFuture;
use hyper::http::Method;
use regex::Regex;

fn text(
    body: &'static str,
) -> impl for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static {
    move |ctx| {
        Box::pin(async move {
            ctx.write_string(body)?;
            Ok(())
        })
    }
}

fn echo_params() -> impl for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static {
    |ctx| {
        Box::pin(async move {
            let body = ctx
                .params()
                .iter()
                .map(|p| format!("{}={}", p.key, p.value))
                .collect::<Vec<_>>()
                .join("&");
            ctx.write_string(body)?;
            Ok(())
        })
    }
}

async fn started(server: HttpServer) -> Arc<HttpServer> {
    server.start().await.expect("server should start")
}

#[tokio::test]
async fn test_named_parameters_reach_the_handler() {
    let mut server = HttpServer::new();
    server.get("/blog/:category/:post", echo_params());
    let server = started(server).await;

    let res = call(&server, request(Method::GET, "/blog/go/request-routers")).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body, "category=go&post=request-routers");
}

#[tokio::test]
async fn test_catch_all_captures_the_rest() {
    let mut server = HttpServer::new();
    server.get("/src/*filepath", echo_params());
    let server = started(server).await;

    let res = call(&server, request(Method::GET, "/src/a/b/c.txt")).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body, "filepath=/a/b/c.txt");
}

#[tokio::test]
async fn test_trailing_slash_redirects_keep_the_query() {
    let mut server = HttpServer::new();
    server.get("/users/", text("users"));
    server.post("/form", text("form"));
    let server = started(server).await;

    let res = call(&server, request(Method::GET, "/users?page=2")).await;
    assert_eq!(res.status, 301);
    assert_eq!(res.header("location"), "/users/?page=2");

    let res = call(&server, request(Method::POST, "/form/")).await;
    assert_eq!(res.status, 307);
    assert_eq!(res.header("location"), "/form");
}

#[tokio::test]
async fn test_fixed_path_redirect_is_case_insensitive() {
    let mut server = HttpServer::new();
    server.get("/About/Team", text("team"));
    let server = started(server).await;

    let res = call(&server, request(Method::GET, "/about/team")).await;
    assert_eq!(res.status, 301);
    assert_eq!(res.header("location"), "/About/Team");
}

#[tokio::test]
async fn test_redirects_can_be_disabled() {
    let mut server = HttpServer::new();
    server.get("/users/", text("users"));
    server.router_mut().redirect_trailing_slash = false;
    server.router_mut().redirect_fixed_path = false;
    let server = started(server).await;

    let res = call(&server, request(Method::GET, "/users")).await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn test_method_not_allowed_lists_allowed_methods() {
    let mut server = HttpServer::new();
    server.get("/item", text("get"));
    server.put("/item", text("put"));
    let server = started(server).await;

    let res = call(&server, request(Method::DELETE, "/item")).await;
    assert_eq!(res.status, 405);
    assert_eq!(res.header("allow"), "GET, PUT, OPTIONS");
    assert_eq!(res.body, "Method Not Allowed");
}

#[tokio::test]
async fn test_custom_not_found_and_method_not_allowed() {
    let mut server = HttpServer::new();
    server.get("/item", text("get"));
    server
        .router_mut()
        .set_not_found_handle(|ctx| {
            Box::pin(async move {
                ctx.write_string_c(hyper::http::StatusCode::NOT_FOUND, "nothing here")?;
                Ok(())
            })
        });
    server
        .router_mut()
        .set_method_not_allowed_handle(|ctx| {
            Box::pin(async move {
                ctx.write_string_c(hyper::http::StatusCode::METHOD_NOT_ALLOWED, "try another verb")?;
                Ok(())
            })
        });
    let server = started(server).await;

    let res = call(&server, request(Method::GET, "/missing")).await;
    assert_eq!(res.status, 404);
    assert_eq!(res.body, "nothing here");

    let res = call(&server, request(Method::POST, "/item")).await;
    assert_eq!(res.status, 405);
    assert_eq!(res.header("allow"), "GET, OPTIONS");
    assert_eq!(res.body, "try another verb");
}

#[tokio::test]
async fn test_auto_options_answers_with_allow() {
    let mut config = Config::default();
    config.server.enabled_auto_options = true;
    let mut server = HttpServer::with_config(config);
    server.get("/item", text("get"));
    server.post("/item", text("post"));
    let server = started(server).await;

    let res = call(&server, request(Method::OPTIONS, "/item")).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.header("allow"), "GET, POST, OPTIONS");
    assert!(res.body.is_empty());
}

#[tokio::test]
async fn test_auto_head_shares_the_get_handler() {
    let mut config = Config::default();
    config.server.enabled_auto_head = true;
    let mut server = HttpServer::with_config(config);
    server.get("/page", text("page"));
    let server = started(server).await;

    let res = call(&server, request(Method::HEAD, "/page")).await;
    assert_eq!(res.status, 200);
}

#[tokio::test]
async fn test_group_prefixes_routes() {
    let mut server = HttpServer::new();
    {
        let mut api = server.group("/api");
        api.get("/users/:id", echo_params());
        let mut v2 = api.group("/v2");
        v2.get("/status", text("ok"));
    }
    let server = started(server).await;

    let res = call(&server, request(Method::GET, "/api/users/7")).await;
    assert_eq!(res.body, "id=7");
    let res = call(&server, request(Method::GET, "/api/v2/status")).await;
    assert_eq!(res.body, "ok");
}

#[test]
fn test_registration_errors() {
    let mut router = Router::new();
    router.get("/user/:id", text("user"));
    assert!(matches!(
        router.try_handle(Method::GET, "/user/:name/x", Arc::new(text("x"))),
        Err(DotwebError::RouteConflict(_))
    ));
    assert!(matches!(
        router.try_handle(Method::GET, "/src/*", Arc::new(text("x"))),
        Err(DotwebError::RouteMalformed(_))
    ));
    assert!(matches!(
        router.try_handle(Method::GET, "/a/*rest/b", Arc::new(text("x"))),
        Err(DotwebError::RouteMalformed(_))
    ));
}

#[tokio::test]
async fn test_match_path_compares_routes() {
    let mut server = HttpServer::new();
    server.get("/user/:id", |ctx| {
        Box::pin(async move {
            let server = ctx.server().cloned().expect("attached");
            let same = server.router().match_path(ctx, "/user/9");
            let other = server.router().match_path(ctx, "/about");
            ctx.write_string(format!("{same} {other}"))?;
            Ok(())
        })
    });
    server.get("/about", text("about"));
    let server = started(server).await;

    let res = call(&server, request(Method::GET, "/user/5")).await;
    assert_eq!(res.body, "true false");
}

fn pattern_to_regex(pattern: &str) -> Regex {
    let mut re = String::from("^");
    for (i, segment) in pattern.split('/').enumerate() {
        if i > 0 {
            re.push('/');
        }
        if segment.starts_with('*') {
            re.pop();
            re.push_str("(/.*)");
        } else if segment.starts_with(':') {
            re.push_str("([^/]+)");
        } else {
            re.push_str(&regex::escape(segment));
        }
    }
    re.push('$');
    Regex::new(&re).unwrap()
}

#[test]
fn test_lookup_agrees_with_regex_matching() {
    let patterns = [
        "/",
        "/blog/:category/:post",
        "/blog/:category/:post/comments",
        "/doc/",
        "/doc/go1.html",
        "/files/*filepath",
        "/info/:user/public",
        "/info/:user/project/:project",
        "/search/",
    ];
    let mut tree: Node<&str> = Node::new();
    for pattern in patterns {
        tree.insert(pattern, pattern).unwrap();
    }
    let compiled: Vec<(&str, Regex)> = patterns.iter().map(|p| (*p, pattern_to_regex(p))).collect();

    let requests = [
        "/",
        "/blog/go/routers",
        "/blog/go/routers/comments",
        "/blog/go",
        "/doc/",
        "/doc/go1.html",
        "/doc/go2.html",
        "/files/",
        "/files/a/b.txt",
        "/info/gordon/public",
        "/info/gordon/project/dotweb",
        "/info/gordon",
        "/search/",
        "/search/x",
        "/nothing",
    ];
    for path in requests {
        let mut params = Params::new();
        let found = tree.get_value(path, &mut params).value.copied();
        let expected = compiled
            .iter()
            .filter(|(_, re)| re.is_match(path))
            .map(|(p, _)| *p)
            .next();
        assert_eq!(found, expected, "path {path}");

        if let Some(pattern) = expected {
            let captures = compiled
                .iter()
                .find(|(p, _)| *p == pattern)
                .and_then(|(_, re)| re.captures(path))
                .unwrap();
            let values: Vec<&str> = captures
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect();
            let got: Vec<&str> = params.iter().map(|p| p.value.as_str()).collect();
            assert_eq!(got, values, "params of {path}");
        }
    }
}

#[tokio::test]
async fn test_parallel_lookups_keep_params_separate() {
    let mut router = Router::new();
    router.get("/user/:id/post/:post", text("post"));
    let router = Arc::new(router);

    let mut tasks = Vec::new();
    for i in 0..32 {
        let router = router.clone();
        tasks.push(tokio::spawn(async move {
            for j in 0..100 {
                let mut params = Params::new();
                let path = format!("/user/{i}/post/{j}");
                let (route, _) = router.lookup(&Method::GET, &path, &mut params);
                assert!(route.is_some());
                assert_eq!(params.by_name("id"), i.to_string());
                assert_eq!(params.by_name("post"), j.to_string());
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}
