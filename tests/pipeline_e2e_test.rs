//! End-to-end pipeline scenarios: the full happy path through all six
//! transitions, the rate-limited failure path, cache idempotency, operator
//! cancellation, and the audited retry override.

mod common;

use common::{build_harness, test_config, MockPublisher};
use pipeline_core::constants::topics;
use pipeline_core::orchestration::ItemStatus;
use pipeline_core::Stage;
use std::sync::atomic::Ordering;
use std::time::Duration;
use uuid::Uuid;

async fn wait_for_stage(
    harness: &common::TestHarness,
    item_id: Uuid,
    stage: Stage,
) -> ItemStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let status = harness.core.pipeline_status(item_id).await.unwrap();
        if status.stage == stage {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for stage {stage}, currently {}",
            status.stage
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn full_pipeline_six_transitions_six_events() {
    let harness = build_harness(test_config(), MockPublisher::new("instagram", "abc123"));
    let mut events = harness.core.subscribe(topics::ITEM_TRANSITIONED).await;
    harness.core.start().await;

    let item_id = harness.core.enqueue("trend topic", "seed-1").await.unwrap();

    // Workers advance Discovered -> BlueprintGenerated, then idle on approval
    wait_for_stage(&harness, item_id, Stage::BlueprintGenerated).await;
    harness.core.approve(item_id).await.unwrap();

    // Approval unblocks scheduling, publishing, and analytics
    let status = wait_for_stage(&harness, item_id, Stage::Analyzed).await;
    assert_eq!(status.version, 6);
    assert_eq!(status.progress_percent, 100);

    // Exactly six events, in transition order, all for this item
    let expected = [
        (None, Stage::Discovered),
        (Some(Stage::Discovered), Stage::BlueprintGenerated),
        (Some(Stage::BlueprintGenerated), Stage::Approved),
        (Some(Stage::Approved), Stage::Scheduled),
        (Some(Stage::Scheduled), Stage::Published),
        (Some(Stage::Published), Stage::Analyzed),
    ];
    for (from, to) in expected {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event within timeout")
            .expect("bus open");
        assert_eq!(event.item_id, Some(item_id));
        assert_eq!(event.from_stage, from);
        assert_eq!(event.to_stage, Some(to));
    }
    assert!(events.try_recv().is_err(), "no extra events were published");

    // Post id and aggregated analytics landed on the item outputs
    assert_eq!(harness.publisher.publish_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.publisher.metrics_calls.load(Ordering::SeqCst), 1);

    let metrics = harness.core.metrics();
    assert_eq!(metrics.started, 1);
    assert_eq!(metrics.completed, 1);
    assert_eq!(metrics.failed, 0);

    harness.core.shutdown().await;
}

#[tokio::test]
async fn four_rate_limits_fail_the_item() {
    let harness = build_harness(
        test_config(),
        MockPublisher::always_rate_limited("instagram"),
    );
    harness.core.start().await;

    let item_id = harness.core.enqueue("doomed topic", "seed-2").await.unwrap();
    wait_for_stage(&harness, item_id, Stage::BlueprintGenerated).await;
    harness.core.approve(item_id).await.unwrap();

    let status = wait_for_stage(&harness, item_id, Stage::Failed).await;
    assert_eq!(status.failure_count, 1);

    // The publisher consumed the whole attempt budget
    assert_eq!(harness.publisher.publish_calls.load(Ordering::SeqCst), 4);

    let metrics = harness.core.metrics();
    assert_eq!(metrics.failed, 1);
    assert_eq!(metrics.completed, 0);

    harness.core.shutdown().await;
}

#[tokio::test]
async fn blueprint_is_cached_per_fingerprint() {
    let harness = build_harness(test_config(), MockPublisher::new("instagram", "p-1"));
    harness.core.start().await;

    let item_id = harness.core.enqueue("repeat topic", "same-seed").await.unwrap();
    wait_for_stage(&harness, item_id, Stage::BlueprintGenerated).await;

    // A second item with identical generation inputs shares the fingerprint
    // and is served from cache without another provider call
    let sibling = harness.core.enqueue("repeat topic", "same-seed").await.unwrap();
    wait_for_stage(&harness, sibling, Stage::BlueprintGenerated).await;

    assert_eq!(
        harness.content_provider.blueprint_calls.load(Ordering::SeqCst),
        1
    );
    let stats = harness.core.cache_stats();
    assert!(stats.hits >= 1);

    harness.core.shutdown().await;
}

#[tokio::test]
async fn cancel_parks_item_in_terminal_state() {
    let harness = build_harness(test_config(), MockPublisher::new("instagram", "p-2"));
    harness.core.start().await;

    let item_id = harness.core.enqueue("cancelled topic", "seed-3").await.unwrap();
    wait_for_stage(&harness, item_id, Stage::BlueprintGenerated).await;

    harness.core.cancel(item_id).await.unwrap();
    let status = wait_for_stage(&harness, item_id, Stage::Cancelled).await;
    assert_eq!(status.stage, Stage::Cancelled);

    // Terminal items reject further operator actions
    assert!(harness.core.approve(item_id).await.is_err());
    assert!(harness.core.cancel(item_id).await.is_err());

    harness.core.shutdown().await;
}

#[tokio::test]
async fn discovery_loop_enqueues_surfaced_topics() {
    let harness = build_harness(test_config(), MockPublisher::new("instagram", "p-3"));
    harness.core.start().await;

    let source = std::sync::Arc::new(common::MockDiscoverySource::with_topics(vec![
        ("discovered one", "seed-a"),
        ("discovered two", "seed-b"),
    ]));
    let handle = harness
        .core
        .start_discovery(source, Duration::from_millis(20));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if harness.core.metrics().started == 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "discovery never enqueued the surfaced topics"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    handle.abort();
    harness.core.shutdown().await;
}

#[tokio::test]
async fn retry_from_stage_reruns_failed_work() {
    let harness = build_harness(
        test_config(),
        MockPublisher::always_rate_limited("instagram"),
    );
    harness.core.start().await;

    let item_id = harness.core.enqueue("retried topic", "seed-4").await.unwrap();
    wait_for_stage(&harness, item_id, Stage::BlueprintGenerated).await;
    harness.core.approve(item_id).await.unwrap();
    wait_for_stage(&harness, item_id, Stage::Failed).await;

    // Platform recovers; the operator rewinds the forward-only machine
    harness
        .publisher
        .rate_limits_remaining
        .store(0, Ordering::SeqCst);
    harness
        .core
        .retry_from_stage(item_id, Stage::Scheduled)
        .await
        .unwrap();

    let status = wait_for_stage(&harness, item_id, Stage::Analyzed).await;
    assert_eq!(status.stage, Stage::Analyzed);
    assert!(harness.publisher.publish_calls.load(Ordering::SeqCst) >= 5);

    harness.core.shutdown().await;
}
