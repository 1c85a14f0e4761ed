mod common;

use axum::{body::Body, http::{header, Request, StatusCode}};
use common::{tenant, test_config, TestApp};
use tenancy_api::database::models::{Metric, Plan};
use tenancy_api::services::FailurePolicy;
use uuid::Uuid;

fn post_agent(tenant_id: Uuid) -> Request<Body> {
    Request::post("/api/agents/run")
        .header("x-tenant-id", tenant_id.to_string())
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn exhausted_plan_answers_402_with_payload() {
    let app = TestApp::new();
    let acme = tenant("acme", Plan::Starter);
    app.seed(&acme).await;
    for _ in 0..5_000 {
        app.state.quota.record(&acme, &Metric::ApiCalls).await.unwrap();
    }

    let res = app.get_as("/api/tenant", acme.id).await;
    assert_eq!(res.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(res.body["code"], "QUOTA_EXCEEDED");
    assert_eq!(res.body["metric"], "api_calls");
    assert_eq!(res.body["current"], 5_000);
    assert_eq!(res.body["limit"], 5_000);
    assert_eq!(res.body["upgrade_url"], test_config().quota.upgrade_url);
}

#[tokio::test]
async fn agent_routes_meter_mcp_agents() {
    let app = TestApp::new();
    let acme = tenant("acme", Plan::Free);
    app.seed(&acme).await;

    for _ in 0..3 {
        let res = app.send(post_agent(acme.id)).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["tenant"], acme.id.to_string());
    }
    let res = app.send(post_agent(acme.id)).await;
    assert_eq!(res.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(res.body["metric"], "mcp_agents");
    assert_eq!(res.body["current"], 3);

    // The denied request consumed nothing.
    let usage = app.get_as("/api/tenant/usage", acme.id).await;
    let metrics = usage.body["data"]["metrics"].as_array().unwrap();
    assert_eq!(metrics[0]["metric"], "api_calls");
    assert_eq!(metrics[0]["current"], 4);
    assert_eq!(metrics[1]["metric"], "mcp_agents");
    assert_eq!(metrics[1]["current"], 3);
}

#[tokio::test]
async fn unlimited_plan_is_never_denied() {
    let app = TestApp::new();
    let big = tenant("big", Plan::Scale);
    app.seed(&big).await;

    for _ in 0..50 {
        assert_eq!(app.send(post_agent(big.id)).await.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn rate_limit_answers_429_with_retry_after() {
    let mut config = test_config();
    config.rate_limit.requests = 2;
    config.rate_limit.window_secs = 60;
    let app = TestApp::with_config(config);
    let acme = tenant("acme", Plan::Growth);
    app.seed(&acme).await;

    assert_eq!(app.get_as("/api/tenant", acme.id).await.status, StatusCode::OK);
    assert_eq!(app.get_as("/api/tenant", acme.id).await.status, StatusCode::OK);

    let res = app.get_as("/api/tenant", acme.id).await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.body["code"], "RATE_LIMIT_EXCEEDED");
    let retry_after: u64 = res.headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after), "retry after {}", retry_after);
}

#[tokio::test]
async fn counter_outage_fails_open() {
    let app = TestApp::with_failing_counters(test_config());
    let acme = tenant("acme", Plan::Free);
    app.seed(&acme).await;

    let res = app.get_as("/api/tenant", acme.id).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["subdomain"], "acme");
}

#[tokio::test]
async fn counter_outage_with_closed_policy_is_503() {
    let mut config = test_config();
    config.quota.failure_policy = FailurePolicy::Closed;
    let app = TestApp::with_failing_counters(config);
    let acme = tenant("acme", Plan::Free);
    app.seed(&acme).await;

    let res = app.get_as("/api/tenant", acme.id).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn limit_probe_does_not_count_the_probed_metric() {
    let app = TestApp::new();
    let acme = tenant("acme", Plan::Free);
    app.seed(&acme).await;

    for _ in 0..2 {
        let res = app.get_as("/api/tenant/limits/mcp_agents", acme.id).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["data"]["allowed"], true);
        assert_eq!(res.body["data"]["current"], 0);
        assert_eq!(res.body["data"]["limit"], 3);
    }

    let res = app.get_as("/api/tenant/limits/api-calls!", acme.id).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}
