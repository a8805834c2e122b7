//! The built-in e-commerce scenario: one iteration walks a shopper through health, user
//! lookup, catalogue, order placement, payment, stock and notification services.

mod fixtures;

pub(crate) use fixtures::{Fixtures, Product, User};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use stampede_core::rand::Rng as _;
use stampede_core::{
    RequestResult, RunReport, Scenario, ScenarioError, ScenarioResult, SetupContext, VuContext,
    names,
};
use tracing::info;

const ADDRESS: &str = "123 Main St, City, Country";
const PAYMENT_METHOD: &str = "CREDIT_CARD";

pub(crate) const ERRORS: &str = "errors";
pub(crate) const SUCCESS: &str = "success";

#[derive(Debug, Clone)]
pub(crate) struct MeshScenario {
    base_url: String,
    fixtures: Fixtures,
}

impl MeshScenario {
    pub fn new(base_url: impl Into<String>, fixtures: Fixtures) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fixtures,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn pick(&self, vu: &mut VuContext) -> ScenarioResult<Picks<'_>> {
        let users = &self.fixtures.users;
        let products = &self.fixtures.products;
        if users.is_empty() || products.is_empty() {
            return Err(ScenarioError::msg("fixtures are empty"));
        }

        let rng = vu.rng();
        Ok(Picks {
            user: &users[rng.gen_range(0..users.len())],
            order_user: &users[rng.gen_range(0..users.len())],
            product: &products[rng.gen_range(0..products.len())],
            stock_product: &products[rng.gen_range(0..products.len())],
            quantity: rng.gen_range(1..=5),
            payment_order_id: rng.gen_range(1..=1000),
        })
    }
}

struct Picks<'a> {
    /// Drives the lookup, the bearer token and the notification.
    user: &'a User,
    /// Owner named in the order body; drawn independently of `user`.
    order_user: &'a User,
    product: &'a Product,
    stock_product: &'a Product,
    quantity: u32,
    payment_order_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderItem<'a> {
    product_id: u64,
    product_name: &'a str,
    quantity: u32,
    unit_price: f64,
    total_price: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderRequest<'a> {
    user_id: u64,
    items: Vec<OrderItem<'a>>,
    total_amount: f64,
    shipping_address: &'a str,
    billing_address: &'a str,
    payment_method: &'a str,
}

impl<'a> OrderRequest<'a> {
    fn from_picks(picks: &Picks<'a>) -> Self {
        let product = picks.product;
        let line_total = product.price * f64::from(picks.quantity);
        Self {
            user_id: picks.order_user.id,
            items: vec![OrderItem {
                product_id: product.id,
                product_name: &product.name,
                quantity: picks.quantity,
                unit_price: product.price,
                total_price: line_total,
            }],
            total_amount: line_total,
            shipping_address: ADDRESS,
            billing_address: ADDRESS,
            payment_method: PAYMENT_METHOD,
        }
    }
}

/// Path segment for a created order's `id`: any non-zero number or non-empty string.
fn order_id(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) if n.as_f64().is_some_and(|v| v != 0.0) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequest<'a> {
    order_id: u64,
    amount: f64,
    payment_method: &'a str,
    card_number: &'a str,
    expiry_date: &'a str,
    cvv: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRequest<'a> {
    user_id: u64,
    #[serde(rename = "type")]
    kind: &'a str,
    title: &'a str,
    message: &'a str,
}

/// Records the status and latency checks of one step plus the `errors`/`success` rates.
/// Returns whether the status matched.
fn verify(
    vu: &VuContext,
    step: &str,
    res: &RequestResult,
    expected: u16,
    budget_ms: f64,
) -> ScenarioResult<bool> {
    let status_name = format!("{step} status is {expected}");
    let latency_name = format!("{step} response time < {budget_ms}ms");
    let status_ok = |r: &RequestResult| r.status_is(expected);
    let fast = |r: &RequestResult| r.latency_ms() < budget_ms;
    let checks: [(&str, &dyn Fn(&RequestResult) -> bool); 2] =
        [(status_name.as_str(), &status_ok), (latency_name.as_str(), &fast)];
    vu.check_all(res, &checks);

    let ok = res.status_is(expected);
    vu.add_rate(ERRORS, !ok)?;
    vu.add_rate(SUCCESS, ok)?;
    Ok(ok)
}

#[async_trait]
impl Scenario for MeshScenario {
    fn name(&self) -> &str {
        "ecommerce"
    }

    async fn setup(&self, ctx: &SetupContext<'_>) -> ScenarioResult {
        let plan = &ctx.config.plan;
        info!("Starting load test for microservices platform");
        info!(base_url = %self.base_url, "target");
        info!(
            stages = plan.stages().len(),
            duration = ?plan.total_duration(),
            max_vus = plan.max_target(),
            think_time = ?ctx.config.think_time,
            thresholds = ctx.config.thresholds.len(),
            "load profile"
        );
        Ok(())
    }

    async fn iteration(&self, vu: &mut VuContext) -> ScenarioResult {
        let picks = self.pick(vu)?;
        let user = picks.user;

        let res = vu.get("health", self.url("/actuator/health")).await;
        if !verify(vu, "health check", &res, 200, 200.0)? {
            return Ok(());
        }

        let res = vu
            .get("get_user", self.url(&format!("/api/users/{}", user.id)))
            .await;
        verify(vu, "get user", &res, 200, 300.0)?;

        let res = vu.get("get_products", self.url("/api/products")).await;
        verify(vu, "get products", &res, 200, 400.0)?;

        let order = OrderRequest::from_picks(&picks);
        let bearer = format!("Bearer {}", user.id);
        let res = vu
            .post_json(
                "create_order",
                self.url("/api/orders"),
                &order,
                &[("Authorization", &bearer)],
            )
            .await?;
        if verify(vu, "create order", &res, 201, 1000.0)?
            && let Some(id) = res.json_value("/id").as_ref().and_then(order_id)
        {
            let res = vu
                .get("get_order", self.url(&format!("/api/orders/{id}")))
                .await;
            verify(vu, "get order", &res, 200, 500.0)?;
        }

        let payment = PaymentRequest {
            order_id: picks.payment_order_id,
            amount: order.total_amount,
            payment_method: PAYMENT_METHOD,
            card_number: "4111111111111111",
            expiry_date: "12/25",
            cvv: "123",
        };
        let res = vu
            .post_json("process_payment", self.url("/api/payments"), &payment, &[])
            .await?;
        verify(vu, "process payment", &res, 200, 800.0)?;

        let res = vu
            .get(
                "check_stock",
                self.url(&format!(
                    "/api/inventory/products/{}/stock",
                    picks.stock_product.id
                )),
            )
            .await;
        verify(vu, "check stock", &res, 200, 300.0)?;

        let notification = NotificationRequest {
            user_id: user.id,
            kind: "EMAIL",
            title: "Order Confirmation",
            message: "Your order has been confirmed",
        };
        let res = vu
            .post_json(
                "send_notification",
                self.url("/api/notifications"),
                &notification,
                &[],
            )
            .await?;
        verify(vu, "send notification", &res, 200, 600.0)?;

        Ok(())
    }

    async fn teardown(&self, report: &RunReport) -> ScenarioResult {
        let duration = report.trend(names::HTTP_REQ_DURATION);
        info!("Load test completed");
        info!(
            total_requests = report.counter(names::HTTP_REQS).unwrap_or(0),
            avg_ms = duration.and_then(|t| t.avg).unwrap_or(0.0),
            p95_ms = duration.and_then(|t| t.p95).unwrap_or(0.0),
            error_rate_pct = report.rate(names::HTTP_REQ_FAILED).unwrap_or(0.0) * 100.0,
            "results"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::{RunConfig, Stage, StagePlan};
    use stampede_testserver::TestServer;
    use std::sync::Arc;
    use std::time::Duration;

    fn short_run(seed: u64) -> RunConfig {
        let plan = StagePlan::with_start(
            2,
            vec![Stage::new(Duration::from_millis(800), 2)],
        )
        .unwrap_or_else(|e| panic!("{e}"));
        RunConfig::new(plan)
            .with_control_interval(Duration::from_millis(100))
            .with_graceful_stop(Duration::from_secs(2))
            .with_think_time(Duration::from_millis(50))
            .with_seed(seed)
    }

    #[tokio::test]
    async fn healthy_mesh_passes_every_status_check() {
        let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
        let scenario = Arc::new(MeshScenario::new(server.base_url(), Fixtures::default()));

        let report = stampede_core::run(scenario, short_run(1), None)
            .await
            .unwrap_or_else(|e| panic!("{e}"));

        assert!(report.iterations.completed > 0);
        assert_eq!(report.iterations.failed, 0);
        assert_eq!(report.rate(ERRORS), Some(0.0));
        assert_eq!(report.rate(SUCCESS), Some(1.0));
        assert!(server.stats().orders_created() > 0);
        assert!(server.stats().saw_bearer_auth() > 0);
        assert!(server.stats().saw_json_content_type() > 0);
        let status_checks: Vec<_> = report
            .checks
            .iter()
            .filter(|c| c.name.contains("status is"))
            .collect();
        assert_eq!(status_checks.len(), 8);
        assert!(status_checks.iter().all(|c| c.fails == 0));

        server.shutdown().await;
    }

    #[test]
    fn order_body_names_its_own_user() {
        let fixtures = Fixtures::default();
        let picks = Picks {
            user: &fixtures.users[0],
            order_user: &fixtures.users[2],
            product: &fixtures.products[1],
            stock_product: &fixtures.products[0],
            quantity: 3,
            payment_order_id: 7,
        };

        let order = OrderRequest::from_picks(&picks);
        assert_eq!(order.user_id, fixtures.users[2].id);
        assert_eq!(order.items[0].product_id, fixtures.products[1].id);
        assert_eq!(order.total_amount, fixtures.products[1].price * 3.0);

        let body = serde_json::to_value(&order).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(body["userId"], serde_json::json!(fixtures.users[2].id));
        assert_eq!(body["items"][0]["quantity"], serde_json::json!(3));
    }

    #[test]
    fn created_order_ids_may_be_numbers_or_strings() {
        use serde_json::json;

        assert_eq!(order_id(&json!(42)), Some("42".to_string()));
        assert_eq!(order_id(&json!("ord-7f3a")), Some("ord-7f3a".to_string()));
        assert_eq!(order_id(&json!(0)), None);
        assert_eq!(order_id(&json!("")), None);
        assert_eq!(order_id(&json!(null)), None);
        assert_eq!(order_id(&json!(false)), None);
    }

    #[tokio::test]
    async fn failing_health_ends_the_iteration_early() {
        let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
        server.behavior().force_status(Some(503));
        let scenario = Arc::new(MeshScenario::new(server.base_url(), Fixtures::default()));

        let report = stampede_core::run(scenario, short_run(2), None)
            .await
            .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(report.rate(ERRORS), Some(1.0));
        assert_eq!(server.stats().orders_created(), 0);
        assert!(report.checks.iter().all(|c| c.name.starts_with("health check")));
        assert_eq!(
            report.counter(names::HTTP_REQS),
            Some(report.iterations.total())
        );

        server.shutdown().await;
    }
}
