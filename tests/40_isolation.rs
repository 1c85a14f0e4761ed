mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{dedicated, tenant, TestApp};
use futures::future::join_all;
use tenancy_api::database::models::Plan;

#[tokio::test]
async fn shared_tenants_open_no_dedicated_pool() {
    let app = TestApp::new();
    let acme = tenant("acme", Plan::Growth);
    app.seed(&acme).await;

    assert_eq!(app.get_as("/api/tenant", acme.id).await.status, StatusCode::OK);
    assert_eq!(app.state.pools.dedicated_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_register_one_pool() {
    let app = Arc::new(TestApp::new());
    let big = dedicated("big");
    app.seed(&big).await;

    let requests = (0..16).map(|_| {
        let app = app.clone();
        let id = big.id;
        tokio::spawn(async move { app.get_as("/api/tenant", id).await.status })
    });
    for status in join_all(requests).await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }

    assert_eq!(app.state.pools.dedicated_count().await, 1);
}

#[tokio::test]
async fn each_dedicated_tenant_gets_its_own_pool_once() {
    let app = TestApp::new();
    let big = dedicated("big");
    let other = dedicated("other");
    app.seed(&big).await;
    app.seed(&other).await;

    for _ in 0..3 {
        app.state.pools.get_connection(&big).await.unwrap();
    }
    assert_eq!(app.state.pools.dedicated_count().await, 1);

    app.state.pools.get_connection(&other).await.unwrap();
    assert_eq!(app.state.pools.dedicated_count().await, 2);
}

#[tokio::test]
async fn domain_handlers_receive_the_tenant_pool() {
    let app = TestApp::new();
    let big = dedicated("big");
    app.seed(&big).await;

    let res = app
        .send(
            axum::http::Request::post("/api/agents/run")
                .header("x-tenant-id", big.id.to_string())
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    // Lazy pools hold no connections until first use.
    assert_eq!(res.body["pool_size"], 0);
    assert_eq!(app.state.pools.dedicated_count().await, 1);
}
