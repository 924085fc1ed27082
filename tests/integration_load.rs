/// Integration tests running built-in scenarios against a mock API.
use httpmock::prelude::*;
use rampa::http::{BankingApi, ClientConfig, TransferApi};
use rampa::metrics::{MetricValues, ThresholdSet, HTTP_REQS, HTTP_REQ_FAILED};
use rampa::output::{Formatter, JsonFormatter};
use rampa::scenarios::GetUsersScenario;
use rampa::simulator::{Simulator, SimulatorConfig, Stage, ThinkTime};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn short_profile() -> SimulatorConfig {
    let mut config = SimulatorConfig::new(vec![
        Stage::new(Duration::from_millis(400), 2),
        Stage::new(Duration::from_millis(400), 2),
        Stage::new(Duration::from_millis(200), 0),
    ]);
    config.tick = Duration::from_millis(20);
    config.think_time = Some(ThinkTime::fixed(Duration::from_millis(50)));
    config.graceful_stop = Duration::from_secs(2);
    config.thresholds = vec![ThresholdSet::new(HTTP_REQ_FAILED, &["rate<0.01"])];
    config
}

fn api_for(server: &MockServer, simulator: &Simulator) -> Arc<dyn TransferApi> {
    Arc::new(
        BankingApi::new(ClientConfig::new(server.base_url()))
            .expect("client")
            .with_metrics(simulator.metrics()),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn staged_run_against_healthy_api_passes() {
    let server = MockServer::start_async().await;
    let register = server
        .mock_async(|when, then| {
            when.method(POST).path("/users/register");
            then.status(201)
                .json_body(json!({"username": "test_user1", "favorecidos": [], "saldo": 10000}));
        })
        .await;
    let listing = server
        .mock_async(|when, then| {
            when.method(GET).path("/users");
            then.status(200)
                .header("content-type", "application/json; charset=utf-8")
                .json_body(json!([
                    {"username": "julio", "favorecidos": ["priscila"], "saldo": 10000}
                ]));
        })
        .await;

    let simulator = Simulator::new(short_profile());
    let api = api_for(&server, &simulator);
    let result = simulator
        .run(Arc::new(GetUsersScenario::new(api)))
        .await
        .expect("run should complete");

    // Setup seeds three users before the first iteration.
    assert_eq!(register.hits_async().await, 3);
    assert!(listing.hits_async().await > 0);
    assert!(result.iterations > 0);
    assert_eq!(result.vus_max, 2);
    assert!(result.passed(), "thresholds: {:?}", result.thresholds);

    match result.metric(HTTP_REQS).map(|m| &m.values) {
        Some(MetricValues::Counter { count, .. }) => {
            let count = *count as u64;
            assert!(count >= result.iterations + 3);
            assert!(count <= result.iterations + result.interrupted_iterations + 3);
        }
        other => panic!("unexpected http_reqs values {:?}", other),
    }
    assert!(result.checks.iter().all(|c| c.fails == 0));

    let json = JsonFormatter::new().format_run(&result).expect("json");
    assert!(json.contains("\"scenario\": \"get-users\""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_endpoint_crosses_the_failure_threshold() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/users/register");
            then.status(201).json_body(json!({"username": "x"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/users");
            then.status(500).json_body(json!({"error": "boom"}));
        })
        .await;

    let simulator = Simulator::new(short_profile());
    let api = api_for(&server, &simulator);
    let result = simulator
        .run(Arc::new(GetUsersScenario::new(api)))
        .await
        .expect("iteration failures are not fatal");

    assert!(!result.passed());
    let failed: Vec<_> = result.failed_thresholds().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].metric, HTTP_REQ_FAILED);
    assert!(failed[0].actual.is_some_and(|rate| rate > 0.5));
}
