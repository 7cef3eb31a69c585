//! Integration tests: pipelines.

mod common;

use common::*;
use rsedis_compat::{Commands, Error, RedisErrorKind};

#[tokio::test]
async fn pipeline_set_get() {
    let redis = connected().await;

    let p = redis.pipeline();
    p.set("k", "v").get("k");
    assert_eq!(p.len(), 2);

    let results = p.exec().await.unwrap().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(*results[0].as_ref().unwrap(), "OK");
    assert_eq!(*results[1].as_ref().unwrap(), "v");
}

#[tokio::test]
async fn pipeline_is_one_round_trip() {
    let redis = connected().await;

    let p = redis.pipeline();
    p.set("a", 1).incr("a").get("a");
    p.exec().await.unwrap();

    let batches = redis.driver().batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][0], ["SET", "a", "1"]);
    assert_eq!(batches[0][1], ["INCR", "a"]);
    assert_eq!(batches[0][2], ["GET", "a"]);
}

#[tokio::test]
async fn failure_stays_in_its_slot() {
    let redis = connected().await;
    redis.set("text", "hello").await.unwrap();

    let p = redis.pipeline();
    p.incr("text").get("text").incr("counter");
    let results = p.exec().await.unwrap().unwrap();

    let err = results[0].as_ref().unwrap_err();
    assert_eq!(err.to_string(), "ERR value is not an integer or out of range");
    assert_eq!(err.redis_kind(), Some(&RedisErrorKind::Err));
    assert_eq!(*results[1].as_ref().unwrap(), "hello");
    assert_eq!(*results[2].as_ref().unwrap(), 1i64);
}

#[tokio::test]
async fn missing_key_is_nil() {
    let redis = connected().await;

    let p = redis.pipeline();
    p.get("absent");
    let results = p.exec().await.unwrap().unwrap();
    assert!(results[0].as_ref().unwrap().is_nil());
}

#[tokio::test]
async fn sorted_set_pairs_in_pipeline() {
    let redis = connected().await;

    let p = redis.pipeline();
    p.zadd("board", ["1", "alice", "2.5", "bob"])
        .zrange_withscores("board", 0, -1);
    let mut results = p.exec().await.unwrap().unwrap();

    let pairs = results.pop().unwrap().unwrap();
    assert_eq!(pairs.into_strings().unwrap(), ["alice", "1", "bob", "2.5"]);
    assert_eq!(*results[0].as_ref().unwrap(), 2i64);
}

#[tokio::test]
async fn empty_pipeline_sends_nothing() {
    let redis = connected().await;

    let results = redis.pipeline().exec().await.unwrap().unwrap();
    assert!(results.is_empty());
    assert!(redis.driver().batches().is_empty());
}

#[tokio::test]
async fn discard_resolves_empty() {
    let redis = connected().await;

    let p = redis.pipeline();
    p.set("k", "v");
    p.discard();
    assert!(p.is_empty());

    let results = p.exec().await.unwrap().unwrap();
    assert!(results.is_empty());
    assert!(redis.driver().peek("k").is_none());
}

#[tokio::test]
async fn exec_twice_is_rejected() {
    let redis = connected().await;

    let p = redis.pipeline();
    p.set("k", "v");
    p.exec().await.unwrap();

    assert!(matches!(p.exec().await, Err(Error::Aborted(_))));
    assert_eq!(redis.driver().batches().len(), 1);
}

#[tokio::test]
async fn queue_after_exec_is_rejected() {
    let redis = connected().await;

    let p = redis.pipeline();
    p.set("k", "v");
    p.exec().await.unwrap();
    assert_eq!(p.rejected(), 0);

    p.set("late", "x").get("late");
    assert!(p.is_empty());
    assert_eq!(p.rejected(), 2);
    assert!(matches!(
        p.try_queue(rsedis_compat::Command::new("GET").arg("late")),
        Err(Error::Aborted(_))
    ));
    assert_eq!(p.rejected(), 3);
    assert!(redis.driver().peek("late").is_none());
}

#[tokio::test]
async fn queue_after_discard_is_rejected() {
    let redis = connected().await;

    let p = redis.multi();
    p.discard();
    p.incr("n");
    assert_eq!(p.rejected(), 1);
    assert!(p.exec().await.unwrap().unwrap().is_empty());
}

#[tokio::test]
async fn pipeline_on_lazy_client_connects() {
    let driver = MemoryDriver::new();
    let redis = rsedis_compat::Redis::open(driver, test_options().with_lazy_connect(true))
        .await
        .unwrap();
    assert_eq!(redis.driver().connect_attempts(), 0);

    let p = redis.pipeline();
    p.set("k", "v");
    let results = p.exec().await.unwrap().unwrap();
    assert_eq!(*results[0].as_ref().unwrap(), "OK");
    assert_eq!(redis.driver().connect_attempts(), 1);
}

#[tokio::test]
async fn pipeline_on_closed_client_fails() {
    let redis = connected().await;
    redis.quit().await.unwrap();

    let p = redis.pipeline();
    p.get("k");
    assert!(matches!(p.exec().await, Err(Error::Closed)));
}
