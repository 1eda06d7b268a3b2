mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::MemoryStore;
use pagepool::batcher::{BatcherConfig, UpdateBatcher, UpdateTask};
use pagepool::classify::{CacheSection, Classifier, ClassifierConfig, RuleConfig};
use pagepool::domain::types::DEFAULT_GROUP_ID;
use pagepool::pool::encode::encode_entities;
use pagepool::pool::{ContentPool, ImagePool, KeywordPool, PoolError};
use pagepool::templates::TemplateCache;

#[tokio::test]
async fn keyword_pool_serves_group_then_default_fallback() {
    let store = MemoryStore::shared();
    store.add_keyword(DEFAULT_GROUP_ID, "fallback");
    store.add_keyword(7, "alpha");
    store.add_keyword(7, "beta");
    store.add_keyword(7, "gamma");

    let pool = KeywordPool::new(store.clone());
    pool.start().await.expect("start");

    let picked: HashSet<String> = pool.get_random_raw_keywords(7, 2).into_iter().collect();
    assert_eq!(picked.len(), 2);
    assert!(picked.is_subset(&HashSet::from([
        "alpha".to_string(),
        "beta".to_string(),
        "gamma".to_string(),
    ])));

    assert_eq!(pool.get_raw_keywords(42), vec!["fallback".to_string()]);
    assert_eq!(pool.pop(42).expect("fallback"), encode_entities("fallback"));

    let stats = pool.stats(7);
    assert_eq!(stats.current, 3);
    assert_eq!(stats.capacity, 3);
    assert!(stats.memory_bytes > 0);

    store.add_keyword(7, "delta");
    pool.reload(&[7]).await.expect("reload");
    assert_eq!(pool.stats(7).current, 4);

    pool.stop();
}

#[tokio::test]
async fn empty_image_pool_reports_empty_group() {
    let store = MemoryStore::shared();
    store.add_image(3, "https://img.example/3.png");

    let pool = ImagePool::new(store.clone());
    pool.start().await.expect("start");

    assert_eq!(
        pool.get_random_image(3).as_deref(),
        Some("https://img.example/3.png")
    );
    assert!(pool.get_random_image(9).is_none());
    assert!(matches!(
        pool.pop(9),
        Err(PoolError::EmptyPool { group_id: 9, .. })
    ));
}

#[tokio::test]
async fn template_cache_falls_back_and_tracks_reloads() {
    let store = MemoryStore::shared();
    store.put_template("article", DEFAULT_GROUP_ID, "<default/>", true);
    store.put_template("article", 5, "<five/>", true);

    let cache = TemplateCache::new(store.clone());
    assert_eq!(cache.load_all().await.expect("load"), 2);

    assert_eq!(cache.get("article", 5).expect("exact").content, "<five/>");
    assert_eq!(
        cache.get("article", 9).expect("fallback").content,
        "<default/>"
    );

    store.put_template("article", 5, "<five/>", false);
    cache.reload("article", 5).await.expect("reload");
    assert_eq!(
        cache.get("article", 5).expect("fallback").content,
        "<default/>"
    );

    store.put_template("list", 9, "<list/>", true);
    let read_through = cache
        .get_with_fallback("list", 9)
        .await
        .expect("read through")
        .expect("found");
    assert_eq!(read_through.content, "<list/>");
    assert_eq!(cache.stats().names, 2);
}

#[tokio::test]
async fn batcher_write_back_survives_a_failed_flush() {
    let store = MemoryStore::shared();
    let config = BatcherConfig {
        max_batch: 1_000,
        flush_interval: Duration::from_secs(3_600),
        ..Default::default()
    };
    let batcher = UpdateBatcher::start(store.clone(), config);

    for id in 1..=5 {
        batcher.add(UpdateTask::new("keywords", id)).await;
    }
    batcher.add(UpdateTask::new("sessions", 99)).await;

    *store.fail_next_flush.lock().expect("fail flag") = true;
    assert!(batcher.flush().await.is_err());
    assert_eq!(batcher.pending_len().await, 6);

    batcher.stop().await;
    assert_eq!(store.cleared_ids("keywords"), vec![1, 2, 3, 4, 5]);
    assert!(store.cleared_ids("sessions").is_empty());
    assert_eq!(batcher.pending_len().await, 0);

    let stats = batcher.stats();
    assert_eq!(stats.flushed_tasks, 5);
    assert_eq!(stats.skipped_tasks, 1);
    assert_eq!(stats.flush_errors, 1);
}

#[test]
fn classifier_caches_both_outcomes() {
    let config = ClassifierConfig {
        cache: CacheSection::default(),
        rules: vec![RuleConfig {
            kind: "google".into(),
            name: "Googlebot".into(),
            enabled: true,
            patterns: vec!["googlebot".into()],
            aux_domains: vec!["googlebot.com".into()],
        }],
    };
    let classifier = Arc::new(Classifier::new(&config).expect("rules compile"));

    for _ in 0..3 {
        assert!(classifier.is_match("Mozilla/5.0 (compatible; Googlebot/2.1)"));
        assert!(!classifier.is_match("Mozilla/5.0 (X11; Linux x86_64)"));
    }

    let stats = classifier.stats();
    assert_eq!(stats.cache_misses, 2);
    assert_eq!(stats.cache_hits, 4);
    assert_eq!(stats.cache_size, 2);
    assert_eq!(classifier.aux_domains("google"), vec!["googlebot.com".to_string()]);
}

#[tokio::test]
async fn pool_totals_cover_every_group() {
    let store = MemoryStore::shared();
    store.add_image(DEFAULT_GROUP_ID, "https://img.example/1.png");
    store.add_image(2, "https://img.example/2a.png");
    store.add_image(2, "https://img.example/2b.png");

    let pool = ImagePool::new(store.clone());
    pool.start().await.expect("start");
    pool.append_images(4, ["https://img.example/4.png"]);

    let totals = pool.total_stats();
    assert_eq!(totals.groups, 3);
    assert_eq!(totals.items, 4);
    assert_eq!(totals.memory_bytes, pool.memory_bytes());
}
