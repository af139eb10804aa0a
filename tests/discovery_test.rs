//! Integration tests for the discovery worker.

mod common;

use common::{Fixture, SearchStep, SearcherLog, id, test_config};
use harvest_rs::config::ConfigSource;
use harvest_rs::engine::DiscoveryWorker;
use harvest_rs::error::Error;
use std::sync::Arc;

fn worker(fx: &Fixture, log: &SearcherLog) -> DiscoveryWorker {
    DiscoveryWorker::new(
        Arc::clone(&fx.config),
        Arc::clone(&fx.pending),
        Arc::clone(&fx.processed),
        Arc::clone(&fx.stats),
        log.factory(),
    )
}

#[tokio::test]
async fn keywords_rotate_round_robin() {
    let mut config = test_config();
    config.search.keywords = vec!["a".into(), "b".into(), "c".into()];
    let fx = Fixture::new(config);
    let mut worker = worker(&fx, &SearcherLog::default());

    let order: Vec<_> = (0..5).map(|_| worker.next_keyword().unwrap()).collect();
    assert_eq!(order, vec!["a", "b", "c", "a", "b"]);
}

#[tokio::test]
async fn empty_keyword_list_is_illegal_state() {
    let mut config = test_config();
    config.search.keywords.clear();
    let fx = Fixture::new(config);
    let log = SearcherLog::default();
    let mut worker = worker(&fx, &log);

    assert!(matches!(worker.next_keyword(), Err(Error::IllegalState(_))));
    assert!(matches!(worker.run_cycle().await, Err(Error::IllegalState(_))));
    assert_eq!(log.opens(), 0);
}

#[tokio::test]
async fn results_are_filtered_before_queueing() {
    let mut config = test_config();
    config.search.exclude = vec!["EXCL".into()];
    let fx = Fixture::new(config).with_pending(&["known"]);
    fx.processed.put(id("done"), "1700000000");
    let log = SearcherLog::scripted([SearchStep::Found(vec![
        "X1", "X1", "bad;id", "", "EXCL", "done", " X2 ", "known",
    ])]);
    let mut worker = worker(&fx, &log);

    let added = worker.run_cycle().await.unwrap();

    assert_eq!(added, 2);
    assert_eq!(fx.pending_ids(), vec!["X1", "X2", "known"]);
    assert_eq!(log.keywords(), vec!["alpha"]);

    let on_disk = std::fs::read_to_string(fx.dir.path().join("pending.txt")).unwrap();
    assert_eq!(on_disk.lines().count(), 3);
    assert_eq!(fx.stats.snapshot().discovered, 2);
}

#[tokio::test]
async fn broken_searcher_is_recreated() {
    let fx = Fixture::new(test_config());
    let log = SearcherLog::scripted([SearchStep::Broken, SearchStep::Found(vec!["S1"])]);
    let mut worker = worker(&fx, &log);

    let err = worker.run_cycle().await.unwrap_err();
    assert!(err.is_driver_fault());
    assert_eq!(log.closes.load(std::sync::atomic::Ordering::SeqCst), 1);

    assert_eq!(worker.run_cycle().await.unwrap(), 1);
    assert_eq!(log.opens(), 2);
    assert_eq!(log.keywords(), vec!["alpha", "beta"]);

    let stats = fx.stats.snapshot();
    assert_eq!(stats.recoveries, 1);
    assert_eq!(stats.search_failures, 1);
}

#[tokio::test]
async fn plain_search_errors_keep_the_searcher() {
    let fx = Fixture::new(test_config());
    let log = SearcherLog::scripted([SearchStep::Fail]);
    let mut worker = worker(&fx, &log);

    assert!(worker.run_cycle().await.is_err());
    worker.run_cycle().await.unwrap();
    assert_eq!(log.opens(), 1);
    assert_eq!(fx.stats.snapshot().recoveries, 0);
}

#[tokio::test]
async fn keyword_changes_are_picked_up_on_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvest.toml");
    std::fs::write(&path, "[search]\nkeywords = [\"one\"]\n").unwrap();

    let mut fx = Fixture::new(test_config());
    fx.config = Arc::new(ConfigSource::open(&path).unwrap());
    let log = SearcherLog::default();
    let mut worker = worker(&fx, &log);

    worker.run_cycle().await.unwrap();
    std::fs::write(&path, "[search]\nkeywords = [\"two\"]\n").unwrap();
    worker.run_cycle().await.unwrap();

    assert_eq!(log.keywords(), vec!["one", "two"]);
    assert_eq!(worker.keywords(), ["two".to_string()]);
}
