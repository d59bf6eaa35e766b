//! Identifiers search from submit to pinned record.

mod common;

use common::*;
use efti_portal::{IdentifiersDisplay, Liveness, Notification, StaleResponsePolicy};
use portal_types::{IdentifiersSearchRequest, RequestStatus};

fn search_request() -> IdentifiersSearchRequest {
    IdentifiersSearchRequest::new("AB-123").with_gates(["FR"])
}

#[tokio::test]
async fn pending_then_complete_then_no_more_polls() {
    let api = scripted_api();
    api.script_identifiers("R1", [pending("R1"), complete_with_d1("R1")]);
    let mut h = identifiers_harness(api, &config());

    let request_id = h.search.submit(search_request()).await.unwrap();
    assert_eq!(request_id, "R1");
    assert_eq!(h.search.status(), Some(RequestStatus::Pending));

    h.search.poll_pending(&Liveness::always()).await;
    assert_eq!(h.search.status(), Some(RequestStatus::Pending));
    assert!(h
        .drain()
        .iter()
        .all(|n| !matches!(n, Notification::RequestUpdated { .. })));

    let report = h.search.poll_pending(&Liveness::always()).await;
    assert_eq!(report.completed, vec!["R1".to_string()]);
    assert_eq!(h.search.status(), Some(RequestStatus::Complete));

    let records = h.search.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].dataset_id, "D1");
    assert!(h.drain().iter().any(|n| matches!(
        n,
        Notification::RequestUpdated { request_id, status: RequestStatus::Complete, .. } if request_id == "R1"
    )));

    for _ in 0..3 {
        let report = h.search.poll_pending(&Liveness::always()).await;
        assert_eq!(report.polled, 0);
    }
    assert_eq!(h.api.poll_count("R1"), 2);
}

#[tokio::test]
async fn pinned_record_round_trips_through_the_cache() {
    let api = scripted_api();
    api.script_identifiers("R1", [complete_with_d1("R1")]);
    let h = identifiers_harness(api, &config());
    h.search.submit(search_request()).await.unwrap();
    h.search.poll_pending(&Liveness::always()).await;

    let pinned = h.search.pin_record("D1").unwrap();
    let display = IdentifiersDisplay::load(&h.cache, "D1").unwrap();
    assert_eq!(display.record(), &pinned);
    assert_eq!(display.uil_request().gate_id, "FR");

    let missing = IdentifiersDisplay::load(&h.cache, "D404").unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn error_status_is_terminal_and_summarised() {
    let api = scripted_api();
    api.script_identifiers(
        "R1",
        [portal_types::IdentifiersResponse::new("R1", "ERROR")
            .with_gate_result(portal_types::GateResult::new("BO", "ERROR"))],
    );
    let h = identifiers_harness(api, &config());
    h.search.submit(search_request()).await.unwrap();
    h.search.poll_pending(&Liveness::always()).await;

    assert_eq!(h.search.status(), Some(RequestStatus::Error));
    let summary = h.search.summary();
    assert_eq!(
        summary.get("BO").map(|e| e.bucket),
        Some(efti_portal::GateBucket::Error)
    );
    assert!(h.search.records().is_empty());
}

#[tokio::test]
async fn unknown_remote_status_keeps_polling() {
    let api = scripted_api();
    api.script_identifiers(
        "R1",
        [
            portal_types::IdentifiersResponse::new("R1", "QUEUED"),
            complete_with_d1("R1"),
        ],
    );
    let h = identifiers_harness(api, &config());
    h.search.submit(search_request()).await.unwrap();

    h.search.poll_pending(&Liveness::always()).await;
    assert_eq!(h.search.status(), Some(RequestStatus::Pending));
    h.search.poll_pending(&Liveness::always()).await;
    assert_eq!(h.search.status(), Some(RequestStatus::Complete));
}

#[tokio::test]
async fn new_search_drops_the_old_one() {
    let api = scripted_api();
    api.script_identifiers("R1", [complete_with_d1("R1")]);
    let mut config = config();
    config.stale_responses = StaleResponsePolicy::RejectStale;
    let h = identifiers_harness(api, &config);

    h.search.submit(search_request()).await.unwrap();
    h.search.submit(search_request()).await.unwrap();
    h.search.poll_pending(&Liveness::always()).await;

    assert_eq!(h.api.poll_count("R1"), 0);
    assert_eq!(h.api.poll_count("R2"), 1);
    assert_eq!(h.search.current().map(|e| e.request_id), Some("R2".to_string()));
}
