//! Trigger keeper scenario tests.
//!
//! Drives full scan cycles against in-process collaborators:
//! - Deduplication (cooldown registry and in-dispatch flags)
//! - Single-flight cycles and the periodic scheduler
//! - Account index resync throttling
//! - Health checks and failure isolation

mod common;
use common::{account, config, price, signature, stop_below, wait_until, Harness};

use std::time::Duration;

use keeper_core::{AccountEvent, AccountId, MarketKey, MarketKind, Slot};
use keeper_engine::{AttemptId, CycleOutcome, EngineError, LockName, ResyncDecision, ScanSummary};
use keeper_telemetry::metrics::{MUTEX_BUSY_TOTAL, TRIGGER_ERROR_TOTAL};
use keeper_venue::{SubmitError, TriggerBook, VenueClient, VenueError};

fn completed(outcome: CycleOutcome) -> ScanSummary {
    match outcome {
        CycleOutcome::Completed { summary, .. } => summary,
        other => panic!("expected a completed cycle, got {other:?}"),
    }
}

/// One account with one perpetual stop order on perp-0, triggerable at the listed price.
async fn perp_harness(name: &str) -> Harness {
    let h = Harness::new(
        config(name),
        vec![account("alice", vec![stop_below(7, MarketKey::perp(0), 100)])],
    );
    h.venue.add_market(MarketKey::perp(0), price(90));
    h.keeper.init().await.unwrap();
    h
}

// ============================================================================
// Deduplication
// ============================================================================

#[tokio::test]
async fn test_perp_cooldown_prevents_second_dispatch() {
    let h = perp_harness("scenario-perp-cooldown").await;
    h.venue.hold_submissions();

    // First cycle dispatches and leaves the attempt outstanding
    let first = completed(h.keeper.run_cycle().await.unwrap());
    assert_eq!(first.report.dispatched, 1);
    assert!(h.keeper.cooldowns().contains(&signature("alice", 7)));

    // Fresh snapshot, fresh flags, but the cooldown entry still blocks it
    let second = completed(h.keeper.run_cycle().await.unwrap());
    assert_eq!(second.report.candidates, 1);
    assert_eq!(second.report.cooldown_skipped, 1);
    assert_eq!(second.report.dispatched, 0);

    // Outcome handling removes the entry, so the order is eligible again
    h.venue.release_submissions();
    h.settle().await;
    assert!(h.keeper.cooldowns().is_empty());

    let third = completed(h.keeper.run_cycle().await.unwrap());
    assert_eq!(third.report.dispatched, 1);
    h.settle().await;
    assert_eq!(h.venue.submission_count(), 2);
}

#[tokio::test]
async fn test_expired_cooldown_allows_overlapping_attempt() {
    let h = perp_harness("scenario-cooldown-expiry").await;
    h.venue.hold_submissions();

    completed(h.keeper.run_cycle().await.unwrap());
    h.clock.advance(Duration::from_secs(11));

    let second = completed(h.keeper.run_cycle().await.unwrap());
    assert_eq!(second.report.dispatched, 1);
    let entry = h.keeper.cooldowns().get(&signature("alice", 7)).unwrap();
    assert_eq!(entry.attempt, AttemptId(2));

    // The stale attempt finishing must not remove the newer entry twice
    h.venue.release_submissions();
    h.settle().await;
    assert!(h.keeper.cooldowns().is_empty());
    assert_eq!(h.venue.submission_count(), 2);
}

#[tokio::test]
async fn test_flag_kept_after_success_cleared_after_failure() {
    let h = perp_harness("scenario-flags").await;
    let sig = signature("alice", 7);

    // Success: the flag stays set for the rest of the generation
    completed(h.keeper.run_cycle().await.unwrap());
    h.settle().await;
    let first = h.keeper.current_snapshot().await.unwrap();
    assert!(first.in_dispatch().is_marked(&sig));
    assert!(h.alerts.contains(":gear: Triggered perp user (account: alice) perp order: 7"));

    // Failure: the flag is cleared so the order can be retried in the same generation
    h.venue.push_submit_result(Err(SubmitError::Program {
        code: 6001,
        message: "order not triggerable".to_string(),
        logs: vec!["Program log: not triggerable".to_string()],
    }));
    completed(h.keeper.run_cycle().await.unwrap());
    h.settle().await;
    let second = h.keeper.current_snapshot().await.unwrap();
    assert!(second.generation() > first.generation());
    assert!(!second.in_dispatch().is_marked(&sig));
    assert!(h.alerts.contains(":x: Error (6001) triggering perp user"));
    assert!(h.keeper.cooldowns().is_empty());
    assert_eq!(
        TRIGGER_ERROR_TOTAL
            .with_label_values(&["6001", h.venue.identity(), "scenario-flags"])
            .get(),
        1.0
    );
}

#[tokio::test]
async fn test_spot_orders_have_no_cooldown() {
    let h = Harness::new(
        config("scenario-spot"),
        vec![account("bob", vec![stop_below(3, MarketKey::spot(1), 100)])],
    );
    h.venue.add_market(MarketKey::spot(1), price(90));
    h.keeper.init().await.unwrap();
    h.venue.hold_submissions();

    let first = completed(h.keeper.run_cycle().await.unwrap());
    let second = completed(h.keeper.run_cycle().await.unwrap());
    assert_eq!(first.report.dispatched, 1);
    assert_eq!(second.report.dispatched, 1);
    assert_eq!(second.report.cooldown_skipped, 0);
    assert_eq!(h.keeper.in_flight_triggers(), 2);

    h.venue.release_submissions();
    h.settle().await;
    assert!(h.keeper.cooldowns().is_empty());
    assert!(h
        .venue
        .submissions()
        .iter()
        .all(|s| s.market.kind == MarketKind::Spot));
}

#[tokio::test]
async fn test_lookup_failure_rolls_back() {
    let h = Harness::new(config("scenario-lookup"), Vec::new());
    h.venue.add_market(MarketKey::perp(0), price(90));
    let mut book = TriggerBook::new();
    book.insert(AccountId::new("ghost"), stop_below(1, MarketKey::perp(0), 100));
    h.builder.set_fixed_book(book);
    h.keeper.init().await.unwrap();

    let summary = completed(h.keeper.run_cycle().await.unwrap());
    assert_eq!(summary.report.candidates, 1);
    assert_eq!(summary.report.lookup_failed, 1);
    assert_eq!(summary.report.dispatched, 0);

    let snapshot = h.keeper.current_snapshot().await.unwrap();
    assert!(!snapshot.in_dispatch().is_marked(&signature("ghost", 1)));
    assert!(h.keeper.cooldowns().is_empty());
    assert_eq!(h.venue.submission_count(), 0);
}

#[tokio::test]
async fn test_dry_run_does_not_submit() {
    let mut cfg = config("scenario-dry-run");
    cfg.dry_run = true;
    let h = Harness::new(
        cfg,
        vec![account("alice", vec![stop_below(7, MarketKey::perp(0), 100)])],
    );
    h.venue.add_market(MarketKey::perp(0), price(90));
    h.keeper.init().await.unwrap();

    let summary = completed(h.keeper.run_cycle().await.unwrap());
    assert_eq!(summary.report.dispatched, 1);
    h.settle().await;
    assert_eq!(h.venue.submission_count(), 0);
    assert!(h.alerts.contains("tx: dry-run"));
}

#[tokio::test]
async fn test_paused_exchange_yields_no_candidates() {
    let h = perp_harness("scenario-paused").await;
    h.venue.set_exchange_paused(true);

    let summary = completed(h.keeper.run_cycle().await.unwrap());
    assert_eq!(summary.markets_scanned, 1);
    assert_eq!(summary.report.candidates, 0);
}

// ============================================================================
// Cycles and scheduling
// ============================================================================

#[tokio::test]
async fn test_overlapping_cycle_is_busy() {
    let h = perp_harness("scenario-single-flight").await;
    h.builder.set_delay(Duration::from_millis(200));

    let keeper = h.keeper.clone();
    let first = tokio::spawn(async move { keeper.run_cycle().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = h.keeper.run_cycle().await.unwrap();
    assert_eq!(second, CycleOutcome::Busy);
    assert_eq!(
        MUTEX_BUSY_TOTAL
            .with_label_values(&["scenario-single-flight"])
            .get(),
        1.0
    );

    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, CycleOutcome::Completed { .. }));
    assert_eq!(h.builder.build_count(), 1);
}

#[tokio::test]
async fn test_locks_taken_in_order() {
    let h = perp_harness("scenario-lock-order").await;

    completed(h.keeper.run_cycle().await.unwrap());
    h.settle().await;

    assert!(h.observer.order_violations().is_empty());
    assert_eq!(h.observer.acquisitions(LockName::SingleFlight), 1);
    assert!(h.observer.acquisitions(LockName::Snapshot) >= 2);
    assert!(h.observer.acquisitions(LockName::AccountIndex) >= 2);
}

#[tokio::test]
async fn test_snapshot_timeout_skips_cycle() {
    let mut cfg = config("scenario-snapshot-timeout");
    cfg.interval = Duration::from_millis(10);
    cfg.snapshot_lock_timeout_intervals = 2;
    let h = Harness::new(cfg, Vec::new());
    h.keeper.init().await.unwrap();
    h.builder.set_delay(Duration::from_millis(200));

    let outcome = h.keeper.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::LockTimedOut);
    assert!(h.keeper.current_snapshot().await.is_none());
    assert!(h.keeper.liveness().last_pat_ms().is_none());
    assert!(!h.alerts.contains("Uncaught error in main loop"));
}

#[tokio::test]
async fn test_snapshot_build_error_escalates() {
    let h = perp_harness("scenario-build-error").await;
    completed(h.keeper.run_cycle().await.unwrap());
    h.builder.set_fail(true);

    let err = h.keeper.run_cycle().await.unwrap_err();
    assert!(matches!(err, EngineError::Venue(VenueError::SnapshotBuild(_))));
    assert!(h.alerts.contains("Uncaught error in main loop"));
    // The previous snapshot was discarded before the build
    assert!(h.keeper.current_snapshot().await.is_none());
}

#[tokio::test]
async fn test_scheduler_runs_until_shutdown() {
    let mut cfg = config("scenario-scheduler");
    cfg.interval = Duration::from_millis(20);
    let h = Harness::new(cfg, Vec::new());
    h.keeper.init().await.unwrap();

    let handle = h.keeper.start(Duration::from_millis(20));
    wait_until(|| h.keeper.liveness().completed_cycles() >= 2).await;
    assert!(!handle.is_finished());

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_scheduler_stops_on_escalated_failure() {
    let h = Harness::new(config("scenario-scheduler-failure"), Vec::new());
    h.keeper.init().await.unwrap();
    h.builder.set_fail(true);

    let handle = h.keeper.start(Duration::from_millis(20));
    let joined = tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await
        .expect("scheduler should stop");
    assert!(matches!(joined, Err(EngineError::Venue(_))));
}

#[tokio::test]
async fn test_start_interval_drives_liveness_window() {
    let h = perp_harness("scenario-start-interval").await;

    let handle = h.keeper.start(Duration::from_secs(5));
    assert_eq!(h.keeper.interval(), Duration::from_secs(5));
    wait_until(|| h.keeper.liveness().completed_cycles() >= 1).await;

    // Past two configured intervals but within two scheduling intervals
    h.clock.advance(Duration::from_secs(3));
    assert!(h.keeper.health_check().await);

    h.clock.advance(Duration::from_secs(8));
    assert!(!h.keeper.health_check().await);

    handle.shutdown();
    handle.join().await.unwrap();
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn test_market_failures_are_isolated() {
    let h = Harness::new(
        config("scenario-isolation"),
        vec![account(
            "alice",
            vec![
                stop_below(1, MarketKey::perp(0), 100),
                stop_below(2, MarketKey::perp(1), 100),
            ],
        )],
    );
    h.venue.add_market(MarketKey::perp(0), price(90));
    h.venue.add_market(MarketKey::perp(1), price(90));
    h.venue.remove_price(MarketKey::perp(1));
    h.venue.fail_listing(MarketKind::Spot);
    h.keeper.init().await.unwrap();

    let summary = completed(h.keeper.run_cycle().await.unwrap());
    assert_eq!(summary.markets_scanned, 1);
    assert_eq!(summary.markets_failed, 2);
    assert_eq!(summary.report.dispatched, 1);
    assert!(h.alerts.contains("Unexpected error during triggers"));

    h.settle().await;
    let submitted = h.venue.submissions();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].market, MarketKey::perp(0));
}

#[tokio::test]
async fn test_non_positive_reference_price_skips_market() {
    let h = Harness::new(
        config("scenario-zero-price"),
        vec![account("alice", vec![stop_below(1, MarketKey::perp(0), 100)])],
    );
    h.venue.add_market(MarketKey::perp(0), price(0));
    h.keeper.init().await.unwrap();

    let summary = completed(h.keeper.run_cycle().await.unwrap());
    assert_eq!(summary.markets_failed, 1);
    assert_eq!(summary.report.dispatched, 0);
    assert!(h.alerts.contains("non-positive reference price 0"));

    h.settle().await;
    assert!(h.venue.submissions().is_empty());
}

// ============================================================================
// Account index
// ============================================================================

#[tokio::test]
async fn test_resync_throttled_by_slot_cooldown() {
    let h = Harness::new(
        config("scenario-resync"),
        vec![account("a", Vec::new()), account("b", Vec::new())],
    );
    h.keeper.init().await.unwrap();

    // A new account appears on chain
    h.source.push_record(account("c", Vec::new()));
    h.venue.set_subaccount_count(3);
    h.loader_slots.set(Slot(100));
    assert_eq!(
        h.keeper.resync_if_needed().await.unwrap(),
        ResyncDecision::Started {
            at_slot: Some(Slot(100))
        }
    );
    h.keeper.wait_for_resync().await;
    assert_eq!(h.keeper.account_index_size().await, 3);
    assert_eq!(h.keeper.account_index_generation().await, 2);

    // Still out of sync, but inside the 50-slot cooldown
    h.venue.set_subaccount_count(4);
    h.loader_slots.set(Slot(140));
    assert_eq!(
        h.keeper.resync_if_needed().await.unwrap(),
        ResyncDecision::Deferred {
            slots_remaining: 10
        }
    );
    assert_eq!(h.keeper.last_resync_slot().await, Slot(100));

    h.loader_slots.set(Slot(150));
    assert_eq!(
        h.keeper.resync_if_needed().await.unwrap(),
        ResyncDecision::Started {
            at_slot: Some(Slot(150))
        }
    );
    assert_eq!(h.keeper.last_resync_slot().await, Slot(150));
    h.keeper.wait_for_resync().await;
}

#[tokio::test]
async fn test_account_event_extends_index() {
    let h = Harness::new(config("scenario-account-event"), vec![account("a", Vec::new())]);
    h.keeper.init().await.unwrap();

    h.source.push_record(account("b", Vec::new()));
    h.keeper
        .on_account_event(&AccountEvent::Created {
            account: AccountId::new("b"),
        })
        .await
        .unwrap();
    assert_eq!(h.keeper.account_index_size().await, 2);
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_requires_recent_cycle_and_matching_count() {
    let h = perp_harness("scenario-health").await;
    assert!(!h.keeper.health_check().await, "no cycle has completed yet");

    completed(h.keeper.run_cycle().await.unwrap());
    assert!(h.keeper.health_check().await);

    // Liveness window is two intervals
    h.clock.advance(Duration::from_secs(3));
    assert!(!h.keeper.health_check().await);

    completed(h.keeper.run_cycle().await.unwrap());
    assert!(h.keeper.health_check().await);

    h.venue.set_subaccount_count(5);
    assert!(!h.keeper.health_check().await);

    h.venue.set_subaccount_count(1);
    h.venue.set_fail_state(true);
    assert!(!h.keeper.health_check().await);
}
