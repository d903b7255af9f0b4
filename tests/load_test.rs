//! Load testing for the edge router.

use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_router::config::{EdgeConfig, FunctionRoute, FunctionsConfig};
use edge_router::lifecycle::Shutdown;
use edge_router::runtime::FunctionRegistry;
use edge_router::serve::MemoryAssets;
use edge_router::EdgeServer;

mod common;

#[tokio::test]
async fn test_load_performance() {
    // 1. Function upstream
    let upstream = common::start_mock_backend("Hello from function").await;
    let functions = FunctionRegistry::from_config(&FunctionsConfig {
        default_upstream: None,
        routes: vec![FunctionRoute {
            entrypoint: "api/hello".into(),
            upstream: format!("http://{upstream}"),
            isolation: None,
        }],
    })
    .unwrap();

    // 2. Deployment: rewrite + header route in front of the function
    let deployment = common::deployment(
        r#"{"routes": {
            "none": [
                {"src": "^/.*$", "headers": {"x-served-by": "edge-router"}, "continue": true},
                {"src": "^/hello/(?<name>[^/]+)$", "dest": "/api/hello?name=$name"}
            ]
        }}"#,
        r#"{"/api/hello": {"type": "function", "entrypoint": "api/hello"}}"#,
    );
    let env = common::env_with(functions, MemoryAssets::new());

    // 3. Start router
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = EdgeServer::new(&EdgeConfig::default(), deployment, env);
    let shutdown = Shutdown::new();
    let (_updates_tx, updates_rx) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, server_shutdown).await;
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(300)).await;

    // 4. Run load test
    let concurrency = 20;
    let requests_per_task = 50;
    let total_requests = concurrency * requests_per_task;

    let client = reqwest::Client::new();
    let start = Instant::now();

    let tasks = (0..concurrency).map(|task| {
        let client = client.clone();
        let url = format!("http://{addr}/hello/user{task}");
        async move {
            let mut latencies = Vec::new();
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                if let Ok(res) = client.get(&url).send().await {
                    if res.status().is_success() && res.headers().contains_key("x-served-by") {
                        latencies.push(req_start.elapsed());
                    }
                }
            }
            latencies
        }
    });

    let mut all_latencies: Vec<Duration> = join_all(tasks).await.into_iter().flatten().collect();

    let duration = start.elapsed();
    let rps = total_requests as f64 / duration.as_secs_f64();

    if all_latencies.is_empty() {
        panic!("No successful requests recorded");
    }

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p95 = all_latencies[(all_latencies.len() as f64 * 0.95) as usize];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Requests/sec:   {:.2}", rps);
    println!("P50 Latency:    {:?}", p50);
    println!("P95 Latency:    {:?}", p95);
    println!("P99 Latency:    {:?}", p99);
    println!("Success Rate:   {}/{}", all_latencies.len(), total_requests);
    println!("-------------------------\n");

    assert_eq!(all_latencies.len(), total_requests);

    shutdown.trigger();
}
