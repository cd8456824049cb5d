mod harness;

use std::time::Duration;

use harness::mock_upstream::MockUpstream;
use tollgate_core::{RouteRequest, TenantKey};
use tollgate_gateway::{GatewayError, RequestState};
use tollgate_ratelimit::RateWindow;

#[tokio::test]
async fn over_budget_model_is_replaced_by_affordable_candidate() {
    let upstream = MockUpstream::start().await.unwrap();
    let config = harness::upstream_config(
        &upstream.base_url(),
        r"
[budget]
total_limit = 1.0
",
    );
    let gateway = harness::gateway(&config);
    let tenant = TenantKey::new("acme");

    // 100 tokens: 1.50 on "big", 0.80 on "cheap"
    let result = gateway
        .route(RouteRequest::new(tenant.clone(), "code", harness::prompt_of(400)))
        .await
        .unwrap();

    assert_eq!(result.model, "cheap");
    assert_eq!(result.downgraded_from.as_deref(), Some("big"));
    assert!((result.cost - 0.8).abs() < 1e-9);
    assert_eq!(upstream.requests()[0].model, "cheap");

    // Only 0.20 left: nothing fits and nothing reaches upstream
    let err = gateway
        .route(RouteRequest::new(tenant.clone(), "code", harness::prompt_of(400)))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::BudgetExceeded { .. }));
    assert_eq!(err.terminal_state(), RequestState::Rejected);
    assert_eq!(upstream.request_count(), 1);
    assert!((gateway.spent(&tenant) - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn per_task_limit_only_applies_to_its_task() {
    let config = harness::offline_config(
        r"
[budget.per_task_limits]
code = 0.5
",
    );
    let gateway = harness::gateway(&config);
    let tenant = TenantKey::new("acme");

    let err = gateway
        .route(RouteRequest::new(tenant.clone(), "code", harness::prompt_of(400)))
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "budget_exceeded");

    gateway
        .route(RouteRequest::new(tenant, "general", harness::prompt_of(400)))
        .await
        .unwrap();
}

#[tokio::test]
async fn tenant_budgets_are_isolated() {
    let config = harness::offline_config(
        r#"
[tenants."acme".budget]
total_limit = 0.5
"#,
    );
    let gateway = harness::gateway(&config);

    let err = gateway
        .route(RouteRequest::new(TenantKey::new("acme"), "general", harness::prompt_of(400)))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::BudgetExceeded { .. }));

    let result = gateway
        .route(RouteRequest::new(TenantKey::new("globex"), "general", harness::prompt_of(400)))
        .await
        .unwrap();
    assert!((result.cost - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn eleventh_request_in_a_minute_is_rejected() {
    let upstream = MockUpstream::start().await.unwrap();
    let config = harness::upstream_config(
        &upstream.base_url(),
        r"
[rate_limit]
per_minute = 10
",
    );
    let gateway = harness::gateway(&config);
    let tenant = TenantKey::new("acme");

    for i in 0..10 {
        gateway
            .route(RouteRequest::new(tenant.clone(), "general", format!("question {i}")))
            .await
            .unwrap();
    }

    let err = gateway
        .route(RouteRequest::new(tenant.clone(), "general", "question 10"))
        .await
        .unwrap_err();

    let GatewayError::RateLimited { window, retry_after } = err else {
        panic!("expected a rate limit rejection, got {err:?}");
    };
    assert_eq!(window, RateWindow::Minute);
    assert!(retry_after > Duration::ZERO && retry_after <= Duration::from_secs(60));
    assert_eq!(upstream.request_count(), 10);

    // Another workspace of the same tenant has its own buckets
    gateway
        .route(RouteRequest::new(
            TenantKey::with_workspace("acme", "research"),
            "general",
            "question 11",
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn evicted_tenant_starts_fresh() {
    let config = harness::offline_config(
        r"
[budget]
total_limit = 1.0
",
    );
    let gateway = harness::gateway(&config);
    let tenant = TenantKey::new("acme");

    gateway
        .route(RouteRequest::new(tenant.clone(), "general", harness::prompt_of(400)))
        .await
        .unwrap();
    assert!(
        gateway
            .route(RouteRequest::new(tenant.clone(), "general", harness::prompt_of(400)))
            .await
            .is_err()
    );

    assert!(gateway.tenant_state().evict(&tenant));
    assert!(gateway.spent(&tenant).abs() < f64::EPSILON);
    gateway
        .route(RouteRequest::new(tenant, "general", harness::prompt_of(400)))
        .await
        .unwrap();
}
