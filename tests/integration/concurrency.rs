//! Concurrency tests for the shared aggregator and concurrent flushes

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use feedwatch::actors::aggregator::StatsAggregator;
use feedwatch::engine::Engine;
use feedwatch::ActorId;
use futures::future::join_all;
use pretty_assertions::assert_eq;

use crate::helpers::*;

const START: i64 = 1_700_000_000;

#[test]
fn test_records_racing_snapshots_land_in_exactly_one_window() {
    let stats = StatsAggregator::new(START);
    let writers_done = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..4u64)
        .map(|t| {
            let stats = stats.clone();
            std::thread::spawn(move || {
                for i in 0..2_000u64 {
                    let at = START + (i as i64 % 300);
                    stats.record(&item(t * 10_000 + i, t, at, ""), at + 2);
                }
            })
        })
        .collect();

    let flusher = {
        let stats = stats.clone();
        let writers_done = writers_done.clone();
        std::thread::spawn(move || {
            let mut flushed = Vec::new();
            let mut at = START;
            while !writers_done.load(Ordering::SeqCst) {
                at += 1;
                flushed.push(stats.snapshot(at));
                std::thread::yield_now();
            }
            flushed
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    writers_done.store(true, Ordering::SeqCst);
    let mut windows = flusher.join().unwrap();
    windows.push(stats.current());

    let total: u64 = windows.iter().map(|w| w.total).sum();
    assert_eq!(total, 8_000);

    for t in 0..4u64 {
        let per_actor: u64 = windows
            .iter()
            .map(|w| w.contributors.get(&ActorId(t)).copied().unwrap_or(0))
            .sum();
        assert_eq!(per_actor, 2_000);
    }

    // every window starts where the previous one was flushed
    for pair in windows.windows(2) {
        assert!(pair[1].window_start >= pair[0].window_start);
    }
}

#[test]
fn test_samples_and_records_share_one_lock() {
    let stats = StatsAggregator::new(START);

    let sampler = {
        let stats = stats.clone();
        std::thread::spawn(move || {
            for n in 0..500 {
                stats.sample_secondary(n);
            }
        })
    };
    let recorder = {
        let stats = stats.clone();
        std::thread::spawn(move || {
            for i in 0..500 {
                stats.record(&item(i, 1, START + 1, ""), START + 2);
            }
        })
    };

    sampler.join().unwrap();
    recorder.join().unwrap();

    let counters = stats.current();
    assert_eq!(counters.total, 500);
    assert_eq!(counters.follower_series, (0..500).collect::<Vec<u64>>());
    assert_eq!(counters.counts_per_minute, vec![500]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_summaries_are_serialized() {
    let feed = ScriptedFeed::new();
    let store = MemorySnapshotStore::new();

    let engine = Engine::new(
        &test_config(r#""followers": false"#),
        deps(feed, store.clone(), Arc::default()),
    )
    .await
    .unwrap();

    let handles = (0..5).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.summarize().await })
    });
    for result in join_all(handles).await {
        assert!(result.unwrap().is_some());
    }

    // written in the order the flushes were serialized
    let written = store.written();
    assert_eq!(written.len(), 5);
    for pair in written.windows(2) {
        assert_eq!(pair[1].feed.window_start, pair[0].feed.window_end);
    }
}
