use std::time::Duration;

use dotweb::cache::{CacheService, RuntimeCache};
use dotweb::testing::{call, request};
use dotweb::{DotwebError, HttpServer};
use hyper::http::Method;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct CachedUser {
    id: u32,
    username: String,
}

#[tokio::test]
async fn test_in_memory_cache_basic_operations() {
    let cache = CacheService::in_memory();

    assert!(cache.get("test_key").await.unwrap().is_none());
    assert_eq!(cache.get_string("test_key").await.unwrap(), "");

    cache.set("test_key", "test_value", None).await.unwrap();
    assert_eq!(
        cache.get("test_key").await.unwrap(),
        Some("test_value".to_string())
    );
    assert!(cache.exists("test_key").await.unwrap());

    assert!(cache.delete("test_key").await.unwrap());
    assert!(!cache.delete("test_key").await.unwrap());
    assert!(!cache.exists("test_key").await.unwrap());
}

#[tokio::test]
async fn test_cache_json_operations() {
    let cache = CacheService::in_memory();
    let user = CachedUser {
        id: 1,
        username: "john_doe".to_string(),
    };

    cache.set_json("user:1", &user, None).await.unwrap();
    let cached: Option<CachedUser> = cache.get_json("user:1").await.unwrap();
    assert_eq!(cached, Some(user));

    cache.set("user:2", "{broken", None).await.unwrap();
    let broken = cache.get_json::<CachedUser>("user:2").await;
    assert!(matches!(broken, Err(DotwebError::CacheStoreFailure(_))));
}

#[tokio::test]
async fn test_cache_ttl_expiry() {
    let runtime = RuntimeCache::new();
    let cache = CacheService::new(runtime.clone());

    cache
        .set("short", "soon gone", Some(Duration::from_millis(50)))
        .await
        .unwrap();
    cache
        .set("forever", "stays", Some(Duration::ZERO))
        .await
        .unwrap();
    assert!(cache.exists("short").await.unwrap());

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(cache.get("short").await.unwrap().is_none());
    assert!(!cache.exists("short").await.unwrap());
    assert_eq!(cache.get_string("forever").await.unwrap(), "stays");

    cache.set("other", "x", Some(Duration::from_millis(10))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    runtime.gc().await;
    assert_eq!(runtime.len().await, 1);
}

#[tokio::test]
async fn test_integer_helpers() {
    let cache = CacheService::in_memory();

    assert_eq!(cache.get_int("hits").await.unwrap(), 0);
    assert_eq!(cache.incr("hits").await.unwrap(), 1);
    assert_eq!(cache.incr("hits").await.unwrap(), 2);
    assert_eq!(cache.decr("hits").await.unwrap(), 1);
    assert_eq!(cache.get_int64("hits").await.unwrap(), 1);
    assert_eq!(cache.decr("fresh").await.unwrap(), -1);

    cache.set("name", "dotweb", None).await.unwrap();
    assert!(matches!(
        cache.incr("name").await,
        Err(DotwebError::CacheStoreFailure(_))
    ));
    assert!(matches!(
        cache.get_int("name").await,
        Err(DotwebError::CacheStoreFailure(_))
    ));
}

#[tokio::test]
async fn test_concurrent_increments_are_not_lost() {
    let cache = CacheService::in_memory();
    let mut tasks = Vec::new();
    for _ in 0..50 {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..20 {
                cache.incr("counter").await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(cache.get_int("counter").await.unwrap(), 1000);
}

#[tokio::test]
async fn test_clear_all() {
    let cache = CacheService::in_memory();
    cache.set("a", "1", None).await.unwrap();
    cache.set("b", "2", None).await.unwrap();
    cache.clear_all().await.unwrap();
    assert!(!cache.exists("a").await.unwrap());
    assert!(!cache.exists("b").await.unwrap());
}

#[tokio::test]
async fn test_handlers_reach_the_server_cache() {
    let mut server = HttpServer::new();
    server.get("/hit", |ctx| {
        Box::pin(async move {
            let cache = ctx.cache().expect("server has a cache");
            let hits = cache.incr("page:hits").await?;
            ctx.write_string(hits.to_string())?;
            Ok(())
        })
    });
    let server = server.start().await.unwrap();

    call(&server, request(Method::GET, "/hit")).await;
    let res = call(&server, request(Method::GET, "/hit")).await;
    assert_eq!(res.body, "2");
    assert_eq!(
        server.cache().unwrap().get_int("page:hits").await.unwrap(),
        2
    );
}
