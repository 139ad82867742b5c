//! Onboarding Coordinator state machine integration tests (spec §4.3).
//! Requires a reachable Postgres and Redis; see `tests/common/mod.rs`.

mod common;

use serial_test::serial;
use sync_engine::models::{ConnectionStatus, PlatformKind};

#[tokio::test]
#[serial]
async fn test_start_scan_transitions_pending_to_scanning_and_enqueues() {
    let pool = common::test_pool().await;
    let state = common::test_state(pool.clone()).await;
    let user_id = common::new_user_id();
    let connection = common::insert_connection(
        &pool,
        user_id,
        PlatformKind::Shopify,
        ConnectionStatus::Pending,
        serde_json::json!({"shop": "onboarding-test.myshopify.com"}),
    )
    .await;

    let job_id = state.onboarding.start_scan(connection.id).await.expect("start scan");
    assert!(job_id.starts_with("initial-scan-"));

    let refreshed = state.store.get_connection(connection.id).await.expect("reload connection");
    assert_eq!(refreshed.status, ConnectionStatus::Scanning);
    assert_eq!(refreshed.current_job_id(), Some(job_id));
}

/// Idempotency (spec §4.3): re-issuing start-scan while already scanning
/// returns the existing job id instead of enqueuing a second job.
#[tokio::test]
#[serial]
async fn test_start_scan_is_idempotent_while_scanning() {
    let pool = common::test_pool().await;
    let state = common::test_state(pool.clone()).await;
    let user_id = common::new_user_id();
    let connection = common::insert_connection(
        &pool,
        user_id,
        PlatformKind::Shopify,
        ConnectionStatus::Pending,
        serde_json::json!({"shop": "idempotent-test.myshopify.com"}),
    )
    .await;

    let first_job_id = state.onboarding.start_scan(connection.id).await.expect("first start scan");
    let second_job_id = state.onboarding.start_scan(connection.id).await.expect("second start scan");

    assert_eq!(first_job_id, second_job_id);
}

/// Transition table (spec §4.3): `activate-sync` is only accepted from
/// `needs_review`; calling it from `pending` is rejected.
#[tokio::test]
#[serial]
async fn test_activate_sync_rejected_outside_needs_review() {
    let pool = common::test_pool().await;
    let state = common::test_state(pool.clone()).await;
    let user_id = common::new_user_id();
    let connection = common::insert_connection(
        &pool,
        user_id,
        PlatformKind::Shopify,
        ConnectionStatus::Pending,
        serde_json::json!({}),
    )
    .await;

    let result = state.onboarding.activate_sync(connection.id).await;
    assert!(result.is_err());

    let refreshed = state.store.get_connection(connection.id).await.expect("reload connection");
    assert_eq!(refreshed.status, ConnectionStatus::Pending);
}

/// `needs_review -> syncing`, and re-issuing while syncing returns the same
/// job id (spec §4.3).
#[tokio::test]
#[serial]
async fn test_activate_sync_from_needs_review_is_idempotent() {
    let pool = common::test_pool().await;
    let state = common::test_state(pool.clone()).await;
    let user_id = common::new_user_id();
    let connection = common::insert_connection(
        &pool,
        user_id,
        PlatformKind::Shopify,
        ConnectionStatus::NeedsReview,
        serde_json::json!({}),
    )
    .await;

    let first = state.onboarding.activate_sync(connection.id).await.expect("activate sync");
    let refreshed = state.store.get_connection(connection.id).await.expect("reload connection");
    assert_eq!(refreshed.status, ConnectionStatus::Syncing);

    let second = state.onboarding.activate_sync(connection.id).await.expect("re-activate while syncing");
    assert_eq!(first, second);
}

/// `any -> inactive` (spec §4.3): disconnect soft-deletes regardless of the
/// current status, and a job's `should_continue` check observes it.
#[tokio::test]
#[serial]
async fn test_disconnect_sets_inactive_and_disables_the_connection() {
    let pool = common::test_pool().await;
    let state = common::test_state(pool.clone()).await;
    let user_id = common::new_user_id();
    let connection = common::insert_connection(
        &pool,
        user_id,
        PlatformKind::Square,
        ConnectionStatus::Active,
        serde_json::json!({"merchantId": "merchant-disconnect"}),
    )
    .await;

    state.onboarding.disconnect(connection.id).await.expect("disconnect");

    let refreshed = state.store.get_connection(connection.id).await.expect("reload connection");
    assert_eq!(refreshed.status, ConnectionStatus::Inactive);
    assert!(!refreshed.enabled);
    assert!(!state.onboarding.should_continue(&refreshed).await);
}

/// Compare-and-set semantics (spec §5): `transition_status` rejects a
/// transition whose expected prior state no longer matches, surfacing a
/// `conflict` rather than silently clobbering a concurrent update.
#[tokio::test]
#[serial]
async fn test_transition_status_conflicts_on_stale_expected_state() {
    let pool = common::test_pool().await;
    let store = sync_engine::store::CanonicalStore::new(pool.clone());
    let user_id = common::new_user_id();
    let connection = common::insert_connection(
        &pool,
        user_id,
        PlatformKind::Shopify,
        ConnectionStatus::Active,
        serde_json::json!({}),
    )
    .await;

    let result = store
        .transition_status(connection.id, &[ConnectionStatus::Pending], ConnectionStatus::Scanning)
        .await;

    assert!(matches!(result, Err(sync_engine::AppError::Conflict { .. })));
}

/// Completing a sync job with zero item failures transitions to `active`;
/// any failures transition to `error` (spec §4.5).
#[tokio::test]
#[serial]
async fn test_complete_sync_routes_by_failure_count() {
    let pool = common::test_pool().await;
    let state = common::test_state(pool.clone()).await;
    let user_id = common::new_user_id();

    let clean = common::insert_connection(
        &pool,
        user_id,
        PlatformKind::Shopify,
        ConnectionStatus::Syncing,
        serde_json::json!({}),
    )
    .await;
    state.onboarding.complete_sync(clean.id, 0).await.expect("complete sync, zero failures");
    let refreshed = state.store.get_connection(clean.id).await.expect("reload");
    assert_eq!(refreshed.status, ConnectionStatus::Active);

    let failed = common::insert_connection(
        &pool,
        user_id,
        PlatformKind::Shopify,
        ConnectionStatus::Syncing,
        serde_json::json!({}),
    )
    .await;
    state.onboarding.complete_sync(failed.id, 3).await.expect("complete sync, with failures");
    let refreshed = state.store.get_connection(failed.id).await.expect("reload");
    assert_eq!(refreshed.status, ConnectionStatus::Error);
}
