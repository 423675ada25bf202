//! Behavior tests for the batch scheduler: worker fan-out, per-record
//! accounting, and output ordering.

use std::sync::Arc;
use std::time::Duration;

use mstlink_tests::*;
use mstlink_core::{BatchScheduler, HttpResponse};

fn pipeline(workers: usize, ordered: bool) -> PipelineConfig {
    PipelineConfig {
        workers,
        deadline: Duration::from_secs(5),
        ordered_output: ordered,
    }
}

fn wired_scheduler(ordered: bool) -> (Arc<FakeHttpClient>, BatchScheduler) {
    let http = FakeHttpClient::new()
        .on("registry.test", Ok(HttpResponse::ok_json(acme_registry_body())))
        .on("vss.test", Ok(HttpResponse::ok_json(acme_insurance_body())))
        .into_arc();
    let orchestrator = Arc::new(orchestrator_with(http.clone()));
    let scheduler = BatchScheduler::new(orchestrator, pipeline(4, ordered))
        .expect("valid pipeline config");
    (http, scheduler)
}

// =============================================================================
// Batch: Accounting
// =============================================================================

#[tokio::test]
async fn a_hundred_identifiers_across_four_workers_are_all_accounted_for() {
    let (_http, scheduler) = wired_scheduler(false);

    // 90 valid identifiers plus 10 that cannot normalize.
    let mut inputs: Vec<String> = (0..90).map(|i| format!("01101985{i:02}")).collect();
    inputs.extend((0..10).map(|i| format!("bad-{i}")));

    let report = scheduler.run(inputs).await;

    assert_eq!(report.records.len(), 100, "one record per input");
    assert_eq!(report.metrics.total_processed, 100);
    assert_eq!(
        report.metrics.complete + report.metrics.partial + report.metrics.failed,
        100,
        "every record lands in exactly one status bucket"
    );
    assert!(report.metrics.failed >= 10, "invalid inputs must fail");
    assert_eq!(report.metrics.complete, 90);
}

#[tokio::test]
async fn repeated_identifiers_in_one_batch_hit_the_cache() {
    let (_http, scheduler) = wired_scheduler(false);

    let inputs = vec![String::from("0110198560"); 20];
    let report = scheduler.run(inputs).await;

    assert_eq!(report.metrics.total_processed, 20);
    assert!(
        report.metrics.cache_hits > 0,
        "duplicate identifiers must be served from cache"
    );
}

#[tokio::test]
async fn latency_percentiles_are_populated() {
    let (_http, scheduler) = wired_scheduler(false);

    let inputs: Vec<String> = (0..10).map(|i| format!("01101985{i:02}")).collect();
    let report = scheduler.run(inputs).await;

    assert!(report.metrics.latency_p95_ms >= report.metrics.latency_p50_ms);
    assert!(report.metrics.elapsed > Duration::ZERO);
}

// =============================================================================
// Batch: Streaming and Live Progress
// =============================================================================

#[tokio::test]
async fn records_stream_as_they_complete_without_waiting_for_the_batch() {
    let (_http, scheduler) = wired_scheduler(false);

    let inputs: Vec<String> = (0..30).map(|i| format!("01101985{i:02}")).collect();
    let mut rx = scheduler.stream(inputs);

    // The first record arrives while the rest of the batch is still running.
    let first = rx.recv().await.expect("at least one record");
    assert_eq!(first.status, RecordStatus::Complete);

    let mut rest = 1;
    while rx.recv().await.is_some() {
        rest += 1;
    }
    assert_eq!(rest, 30);
}

#[tokio::test]
async fn metrics_can_be_polled_while_a_run_is_in_flight() {
    let (_http, scheduler) = wired_scheduler(false);
    let scheduler = Arc::new(scheduler);

    let inputs: Vec<String> = (0..50).map(|i| format!("01101985{i:02}")).collect();
    let runner = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(inputs).await })
    };

    // Poll the live accessor until progress shows up.
    let mut observed = 0;
    for _ in 0..500 {
        observed = scheduler.metrics().total_processed;
        if observed > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(observed > 0, "live metrics never showed progress");

    let report = runner.await.expect("run task completes");
    assert_eq!(report.metrics.total_processed, 50);
    assert_eq!(scheduler.metrics().total_processed, 50);
}

// =============================================================================
// Batch: Ordering
// =============================================================================

#[tokio::test]
async fn ordered_output_preserves_input_order() {
    let (_http, scheduler) = wired_scheduler(true);

    let inputs: Vec<String> = (0..25).map(|i| format!("01101985{i:02}")).collect();
    let report = scheduler.run(inputs.clone()).await;

    let got: Vec<&str> = report.records.iter().map(|r| r.mst.as_str()).collect();
    let want: Vec<&str> = inputs.iter().map(String::as_str).collect();
    assert_eq!(got, want);
}

#[tokio::test]
async fn an_empty_batch_yields_an_empty_report() {
    let (http, scheduler) = wired_scheduler(false);

    let report = scheduler.run(Vec::new()).await;

    assert!(report.records.is_empty());
    assert_eq!(report.metrics.total_processed, 0);
    assert_eq!(http.calls(), 0);
}

#[tokio::test]
async fn a_single_worker_still_drains_the_whole_batch() {
    let http = FakeHttpClient::new()
        .on("registry.test", Ok(HttpResponse::ok_json(acme_registry_body())))
        .on("vss.test", Ok(HttpResponse::ok_json(acme_insurance_body())))
        .into_arc();
    let orchestrator = Arc::new(orchestrator_with(http));
    let scheduler =
        BatchScheduler::new(orchestrator, pipeline(1, false)).expect("valid pipeline config");

    let inputs: Vec<String> = (0..5).map(|i| format!("01101985{i:02}")).collect();
    let report = scheduler.run(inputs).await;

    assert_eq!(report.metrics.total_processed, 5);
    assert_eq!(report.metrics.complete, 5);
}
