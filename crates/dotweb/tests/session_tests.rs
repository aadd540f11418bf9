use std::sync::Arc;
use std::time::Duration;

use dotweb::config::Config;
use dotweb::session::{DEFAULT_SESSION_COOKIE_NAME, RuntimeStore, SessionManager, SessionStore};
use dotweb::shutdown::Shutdown;
use dotweb::testing::{call, request};
use dotweb::HttpServer;
use hyper::http::Method;

#[tokio::test]
async fn test_gc_removes_expired_sessions_from_the_tail() {
    let store = RuntimeStore::new(Duration::from_millis(50));
    store.session_read("a").await.unwrap();
    store.session_read("b").await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    store.session_read("c").await.unwrap();
    store.session_read("a").await.unwrap();
    assert_eq!(store.ids_by_recency(), vec!["a", "c", "b"]);

    assert_eq!(store.session_gc().await.unwrap(), 1);
    assert_eq!(store.ids_by_recency(), vec!["a", "c"]);
    assert_eq!(store.session_gc().await.unwrap(), 0);
}

#[tokio::test]
async fn test_values_are_written_back_to_the_store() {
    let store = RuntimeStore::new(Duration::from_secs(60));
    let state = store.session_read("user-1").await.unwrap();
    state.set("name", "ada").await.unwrap();
    state.set("visits", &3).await.unwrap();
    assert_eq!(state.count(), 2);

    let again = store.session_read("user-1").await.unwrap();
    assert_eq!(again.get_string("name"), "ada");
    assert_eq!(again.get::<i64>("visits"), Some(3));

    again.remove("name").await.unwrap();
    assert_eq!(store.session_read("user-1").await.unwrap().count(), 1);
    again.clear().await.unwrap();
    assert_eq!(store.session_read("user-1").await.unwrap().count(), 0);
}

#[tokio::test]
async fn test_gc_task_stops_on_shutdown() {
    let store = RuntimeStore::new(Duration::from_millis(10));
    store.session_read("short").await.unwrap();
    let manager = SessionManager::new(store.clone(), "", Duration::from_secs(1));
    assert_eq!(manager.cookie_name(), DEFAULT_SESSION_COOKIE_NAME);

    let shutdown = Shutdown::new();
    let task = manager.spawn_gc(shutdown.subscribe());
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("gc task should stop")
        .unwrap();
}

#[test]
fn test_session_ids_are_unique() {
    let ids: std::collections::HashSet<String> =
        (0..200).map(|_| SessionManager::new_session_id()).collect();
    assert_eq!(ids.len(), 200);
}

fn session_server() -> HttpServer {
    let mut config = Config::default();
    config.session.enabled_session = true;
    let mut server = HttpServer::with_config(config);
    server.get("/count", |ctx| {
        Box::pin(async move {
            let session = ctx.session().await?;
            let visits = session.get::<i64>("visits").unwrap_or(0) + 1;
            session.set("visits", &visits).await?;
            ctx.write_string(visits.to_string())?;
            Ok(())
        })
    });
    server.get("/logout", |ctx| {
        Box::pin(async move {
            ctx.destroy_session().await?;
            ctx.write_string("bye")?;
            Ok(())
        })
    });
    server
}

fn session_cookie(res: &dotweb::TestResponse) -> Option<String> {
    res.headers
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(DEFAULT_SESSION_COOKIE_NAME))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

#[tokio::test]
async fn test_session_cookie_is_issued_and_reused() {
    let server = session_server().start().await.unwrap();

    let first = call(&server, request(Method::GET, "/count")).await;
    assert_eq!(first.body, "1");
    let cookie = session_cookie(&first).expect("new session cookie");
    let id = cookie.split('=').nth(1).unwrap();
    assert_eq!(id.len(), 20);
    assert!(id.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));

    let mut req = request(Method::GET, "/count");
    req.headers_mut().insert("cookie", cookie.parse().unwrap());
    let second = call(&server, req).await;
    assert_eq!(second.body, "2");
    assert!(session_cookie(&second).is_none());

    let manager = server.session_manager().unwrap();
    assert_eq!(manager.store().session_count().await.unwrap(), 1);

    let mut req = request(Method::GET, "/logout");
    req.headers_mut().insert("cookie", cookie.parse().unwrap());
    let res = call(&server, req).await;
    assert!(session_cookie(&res).unwrap().ends_with('='));
    assert!(!manager.store().session_exist(id).await.unwrap());
}

#[tokio::test]
async fn test_session_without_manager_is_an_error() {
    let mut server = HttpServer::new();
    server.get("/s", |ctx| {
        Box::pin(async move {
            let err = ctx.session().await.err().unwrap();
            ctx.write_string(err.error_code())?;
            Ok(())
        })
    });
    let server = server.start().await.unwrap();

    let res = call(&server, request(Method::GET, "/s")).await;
    assert_eq!(res.body, "SESSION_STORE_FAILURE");
}

#[tokio::test]
async fn test_custom_store_can_be_installed() {
    let store: Arc<dyn SessionStore> = RuntimeStore::new(Duration::from_secs(5));
    let mut server = session_server();
    server.set_session_manager(SessionManager::new(store.clone(), "sid", Duration::from_secs(5)));
    let server = server.start().await.unwrap();

    let res = call(&server, request(Method::GET, "/count")).await;
    let cookie = res.header("set-cookie");
    assert!(cookie.starts_with("sid="));
    assert_eq!(store.session_count().await.unwrap(), 1);
}
