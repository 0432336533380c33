//! Integration tests for the execution boundary
//!
//! Covers worker dispatch, synchronous mode, the grouping single-flight guard, stale
//! responses after a reload and recovery from a faulting or misbehaving worker.

use lattice_core::{
    BoundaryConfig, EngineSession, ExecutionMode, FieldExtractors, FilterSpec, GroupSpec,
    OperationKind, PivotBoundary, PivotError, PivotWorker, WorkerRequest, WorkerResponse,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Trade {
    desk: &'static str,
    notional: f64,
}

fn create_trades() -> Vec<Trade> {
    vec![
        Trade { desk: "rates", notional: 10.0 },
        Trade { desk: "fx", notional: 20.0 },
        Trade { desk: "credit", notional: 30.0 },
        Trade { desk: "fx", notional: 40.0 },
    ]
}

fn trade_extractors() -> FieldExtractors<Trade> {
    FieldExtractors::new()
        .with("desk", |t: &Trade| t.desk)
        .with("notional", |t: &Trade| t.notional)
}

fn indexed_fields() -> Vec<String> {
    vec!["desk".to_string(), "notional".to_string()]
}

/// Engine worker that sleeps before answering one kind of request
struct SlowWorker {
    session: EngineSession<()>,
    slow: OperationKind,
    delay: Duration,
}

impl SlowWorker {
    fn new(slow: OperationKind, delay: Duration) -> Self {
        Self { session: EngineSession::new(), slow, delay }
    }
}

impl PivotWorker for SlowWorker {
    fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        if request.kind() == self.slow {
            std::thread::sleep(self.delay);
        }
        self.session.handle(request)
    }
}

/// Worker that panics on the first filter request
struct PanickingWorker(EngineSession<()>);

impl PivotWorker for PanickingWorker {
    fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        if let WorkerRequest::ApplyFilters { .. } = request {
            panic!("filter evaluation exploded");
        }
        self.0.handle(request)
    }
}

/// Worker that answers every request with the wrong message
struct ConfusedWorker;

impl PivotWorker for ConfusedWorker {
    fn handle(&mut self, _request: WorkerRequest) -> WorkerResponse {
        WorkerResponse::SortResult { result: Vec::new() }
    }
}

#[tokio::test]
async fn test_worker_and_synchronous_modes_agree() {
    println!("🧪 Testing worker/synchronous equivalence");

    let worker = PivotBoundary::new(BoundaryConfig::default());
    let inline = PivotBoundary::new(BoundaryConfig::synchronous());
    for boundary in [&worker, &inline] {
        boundary.load(create_trades(), &trade_extractors(), &indexed_fields());
        boundary.wait_until_ready().await;
    }
    assert_eq!(worker.mode(), ExecutionMode::Worker);
    assert_eq!(inline.mode(), ExecutionMode::Synchronous);

    let filters = vec![
        FilterSpec::categorical("desk", ["fx", "credit"]),
        FilterSpec::numeric("notional", 15.0, 35.0),
    ];
    let from_worker = worker.apply_filters(filters.clone()).await.unwrap();
    let from_inline = inline.apply_filters(filters).await.unwrap();
    assert_eq!(from_worker, from_inline);
    assert_eq!(from_worker.visible_ids, vec![1, 2]);

    let group_by = GroupSpec::new("notional").with_buckets(2);
    let grouped = worker.compute_grouping(from_worker.visible_ids.clone(), group_by.clone()).await.unwrap();
    assert_eq!(grouped, inline.compute_grouping(from_inline.visible_ids.clone(), group_by).await.unwrap());
    let labels: Vec<&str> = grouped.groups.iter().map(|g| g.label.as_str()).collect();
    assert_eq!(labels, vec!["20.0 - 25.0", "25.0 - 30.0"]);

    let sorted = worker.sort_ids(vec![0, 1, 2, 3], "desk").await.unwrap();
    assert_eq!(sorted, inline.sort_ids(vec![0, 1, 2, 3], "desk").await.unwrap());
    assert_eq!(sorted, vec![2, 1, 3, 0]);

    let facets = worker.facet_counts(&from_worker.visible_ids, "desk");
    assert_eq!(facets.iter().map(|f| f.count).sum::<usize>(), 2);

    println!("✅ Worker and synchronous results match");
}

#[tokio::test]
async fn test_operations_before_load_return_empty_results() {
    let boundary: PivotBoundary<Trade> = PivotBoundary::new(BoundaryConfig::default());

    assert_eq!(boundary.generation(), 0);
    assert!(boundary.store().is_none());
    assert_eq!(boundary.apply_filters(Vec::new()).await.unwrap().count, 0);
    assert!(boundary.compute_grouping(vec![0], GroupSpec::new("desk")).await.unwrap().is_empty());
    assert_eq!(boundary.sort_ids(vec![1, 0], "desk").await.unwrap(), vec![1, 0]);
}

#[tokio::test]
async fn test_concurrent_grouping_is_rejected() {
    let worker = SlowWorker::new(OperationKind::ComputeGrouping, Duration::from_millis(100));
    let boundary = PivotBoundary::with_worker(BoundaryConfig::default(), worker);
    boundary.load(create_trades(), &trade_extractors(), &indexed_fields());
    boundary.wait_until_ready().await;

    let (first, second) = tokio::join!(
        boundary.compute_grouping(vec![0, 1, 2, 3], GroupSpec::new("desk")),
        boundary.compute_grouping(vec![0, 1, 2, 3], GroupSpec::new("desk")),
    );
    assert_eq!(first.unwrap().groups.len(), 3);
    assert!(second.unwrap().is_empty());

    // the guard is released once the first call completes
    let third = boundary.compute_grouping(vec![1, 3], GroupSpec::new("desk")).await.unwrap();
    assert_eq!(third.groups.len(), 1);
}

#[tokio::test]
async fn test_reload_supersedes_in_flight_requests() {
    let worker = SlowWorker::new(OperationKind::Sort, Duration::from_millis(150));
    let boundary = PivotBoundary::with_worker(BoundaryConfig::default(), worker);
    let first_generation = boundary.load(create_trades(), &trade_extractors(), &indexed_fields());
    boundary.wait_until_ready().await;

    let reload = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        boundary.load(create_trades()[..2].to_vec(), &trade_extractors(), &indexed_fields())
    };
    let (sorted, second_generation) = tokio::join!(boundary.sort_ids(vec![3, 2, 1, 0], "notional"), reload);

    assert_eq!(second_generation, first_generation + 1);
    match sorted {
        Err(PivotError::Superseded { request_generation, current_generation, .. }) => {
            assert_eq!(request_generation, first_generation);
            assert_eq!(current_generation, second_generation);
        }
        other => panic!("expected a superseded error, got {other:?}"),
    }

    boundary.wait_until_ready().await;
    assert_eq!(boundary.store().unwrap().count(), 2);
    assert_eq!(boundary.mode(), ExecutionMode::Worker);
}

#[tokio::test]
async fn test_worker_fault_falls_back_to_local_execution() {
    println!("🧪 Testing worker fault recovery");

    let boundary = PivotBoundary::with_worker(BoundaryConfig::default(), PanickingWorker(EngineSession::new()));
    boundary.load(create_trades(), &trade_extractors(), &indexed_fields());
    boundary.wait_until_ready().await;
    assert_eq!(boundary.mode(), ExecutionMode::Worker);

    // the request that hit the panic is still answered
    let result = boundary.apply_filters(vec![FilterSpec::categorical("desk", ["fx"])]).await.unwrap();
    assert_eq!(result.visible_ids, vec![1, 3]);
    assert_eq!(boundary.mode(), ExecutionMode::Synchronous);

    let sorted = boundary.sort_ids(result.visible_ids, "notional").await.unwrap();
    assert_eq!(sorted, vec![1, 3]);

    // reloads after the fault are served locally and ready at once
    boundary.load(create_trades(), &trade_extractors(), &indexed_fields());
    assert!(boundary.is_ready());

    println!("✅ Boundary recovered in synchronous mode");
}

#[tokio::test]
async fn test_mismatched_responses_are_answered_locally() {
    let boundary = PivotBoundary::with_worker(BoundaryConfig::default(), ConfusedWorker);
    boundary.load(create_trades(), &trade_extractors(), &indexed_fields());
    boundary.wait_until_ready().await;
    assert!(boundary.is_ready());

    let result = boundary.apply_filters(vec![FilterSpec::numeric("notional", 0.0, 25.0)]).await.unwrap();
    assert_eq!(result.visible_ids, vec![0, 1]);
    assert_eq!(boundary.mode(), ExecutionMode::Worker);
}

#[tokio::test]
async fn test_unacknowledged_indexes_time_out_into_fallback() {
    let worker = SlowWorker::new(OperationKind::BuildIndexes, Duration::from_millis(300));
    let config = BoundaryConfig::default().with_response_timeout(Some(Duration::from_millis(25)));
    let boundary = PivotBoundary::with_worker(config, worker);

    boundary.load(create_trades(), &trade_extractors(), &indexed_fields());
    assert!(!boundary.is_ready());

    boundary.wait_until_ready().await;
    assert!(boundary.is_ready());
    assert_eq!(boundary.mode(), ExecutionMode::Synchronous);

    let grouped = boundary.compute_grouping(vec![0, 1, 2, 3], GroupSpec::new("notional")).await.unwrap();
    assert_eq!(grouped.total_count(), 4);
}

#[tokio::test]
async fn test_drop_after_timeout_detaches_the_stalled_worker() {
    let worker = SlowWorker::new(OperationKind::Sort, Duration::from_secs(3));
    let config = BoundaryConfig::default().with_response_timeout(Some(Duration::from_millis(30)));
    let boundary = PivotBoundary::with_worker(config, worker);
    boundary.load(create_trades(), &trade_extractors(), &indexed_fields());
    boundary.wait_until_ready().await;

    let sorted = boundary.sort_ids(vec![3, 0], "notional").await.unwrap();
    assert_eq!(sorted, vec![0, 3]);
    assert_eq!(boundary.mode(), ExecutionMode::Synchronous);

    let started = Instant::now();
    drop(boundary);
    assert!(started.elapsed() < Duration::from_secs(1), "drop waited {:?}", started.elapsed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reloads_never_mislabel_answers() {
    println!("🧪 Testing reloads racing filter requests");

    // the n-th load holds n trades, so an unfiltered count names the store it came from
    let boundary: Arc<PivotBoundary<Trade>> = Arc::new(PivotBoundary::new(BoundaryConfig::default()));
    let done = Arc::new(AtomicBool::new(false));

    let loader = {
        let boundary = Arc::clone(&boundary);
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            for size in 1..=80 {
                let trades: Vec<Trade> =
                    (0..size).map(|i| Trade { desk: "rates", notional: i as f64 }).collect();
                boundary.load(trades, &trade_extractors(), &indexed_fields());
                std::thread::yield_now();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let boundary = Arc::clone(&boundary);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                let mut answered = 0_usize;
                while !done.load(Ordering::SeqCst) {
                    let before = boundary.generation();
                    match boundary.apply_filters(Vec::new()).await {
                        Ok(result) => {
                            let count = result.count as u64;
                            assert!(count >= before, "answer from store {count} issued at generation {before}");
                            assert!(count <= boundary.generation());
                            answered += 1;
                        }
                        Err(PivotError::Superseded { .. }) => {}
                        Err(other) => panic!("unexpected error: {other:?}"),
                    }
                }
                answered
            })
        })
        .collect();

    for reader in readers {
        reader.await.unwrap();
    }
    loader.join().unwrap();

    boundary.wait_until_ready().await;
    assert_eq!(boundary.generation(), 80);
    assert_eq!(boundary.apply_filters(Vec::new()).await.unwrap().count, 80);

    println!("✅ Every answer matched the store it was issued against");
}
