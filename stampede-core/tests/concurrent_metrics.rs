use std::sync::Arc;
use std::time::Duration;

use stampede_metrics::{MetricKind, MetricValue, Registry, Sample};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn a_thousand_users_incrementing_lose_no_updates() {
    let metrics = Arc::new(Registry::default());

    let tasks: Vec<_> = (0..1000)
        .map(|i| {
            let metrics = metrics.clone();
            tokio::spawn(async move {
                // Half the users share a series, half get their own, so both the first-insert
                // path and the hot path are contended.
                let user = (i % 2 == 0).then(|| i.to_string()).unwrap_or_default();
                metrics
                    .record("hits", &[("user", user.as_str())], Sample::Counter(1))
                    .unwrap_or_else(|e| panic!("{e}"));
                metrics
                    .record("ok", &[], Sample::Rate(i % 4 != 0))
                    .unwrap_or_else(|e| panic!("{e}"));
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap_or_else(|e| panic!("{e}"));
    }

    let (hits, _) = metrics
        .lookup("hits")
        .unwrap_or_else(|| panic!("hits not registered"));
    assert_eq!(metrics.query(hits).sum_counter_total(), 1000);

    let (ok, _) = metrics
        .lookup("ok")
        .unwrap_or_else(|| panic!("ok not registered"));
    assert_eq!(
        metrics.query(ok).value(),
        Some(MetricValue::Rate {
            total: 1000,
            hits: 750,
            rate: 0.75
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn custom_metrics_registered_mid_run_do_not_stall_builtin_series() {
    const USERS: usize = 64;
    const STEPS: usize = 200;

    let metrics = Arc::new(Registry::default());
    let reqs = metrics
        .register("http_reqs", MetricKind::Counter)
        .unwrap_or_else(|e| panic!("{e}"));

    let tasks: Vec<_> = (0..USERS)
        .map(|vu| {
            let metrics = metrics.clone();
            tokio::task::spawn_blocking(move || {
                for step in 0..STEPS {
                    let name = format!("step_{vu}_{step}");
                    match vu % 3 {
                        0 => {
                            metrics
                                .record(&format!("errors_{vu}_{step}"), &[], Sample::Rate(false))
                                .unwrap_or_else(|e| panic!("{e}"));
                        }
                        1 => {
                            let id = metrics
                                .register(&format!("latency_{vu}_{step}"), MetricKind::Trend)
                                .unwrap_or_else(|e| panic!("{e}"));
                            metrics
                                .handle(id, metrics.resolve_tags(&[("name", name.as_str())]))
                                .unwrap_or_else(|e| panic!("{e}"))
                                .observe_trend(1.0);
                        }
                        _ => {
                            metrics
                                .handle(reqs, metrics.resolve_tags(&[("name", name.as_str())]))
                                .unwrap_or_else(|e| panic!("{e}"))
                                .increment(1);
                        }
                    }
                }
            })
        })
        .collect();

    let all = async {
        for task in tasks {
            task.await.unwrap_or_else(|e| panic!("{e}"));
        }
    };
    tokio::time::timeout(Duration::from_secs(30), all)
        .await
        .unwrap_or_else(|_| panic!("metric registry stalled"));

    let writers = (0..USERS).filter(|vu| vu % 3 == 2).count();
    assert_eq!(
        metrics.query(reqs).sum_counter_total(),
        (writers * STEPS) as u64
    );
}
