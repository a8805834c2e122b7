//! Mock e-commerce services: health, users, products, orders, payments, inventory and
//! notifications. Responses are canned; request bodies are validated as JSON.

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/actuator/health", get(health))
        .route("/api/users/{id}", get(get_user))
        .route("/api/products", get(list_products))
        .route("/api/orders", post(create_order))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/payments", post(process_payment))
        .route("/api/inventory/products/{id}/stock", get(product_stock))
        .route("/api/notifications", post(send_notification))
}

/// Shared prologue: count, delay, and honour a forced status.
async fn enter(state: &AppState, headers: &HeaderMap) -> Option<Response> {
    state.stats.inc_requests_total();
    if headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
    {
        state.stats.inc_saw_json_content_type();
    }
    if headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "))
    {
        state.stats.inc_saw_bearer_auth();
    }

    state.behavior.delay().await;
    state
        .behavior
        .forced_status()
        .map(|status| (status, Json(json!({ "error": "forced" }))).into_response())
}

fn parse<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response())
}

async fn health(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(res) = enter(&state, &headers).await {
        return res;
    }
    Json(json!({ "status": "UP" })).into_response()
}

async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    if let Some(res) = enter(&state, &headers).await {
        return res;
    }
    Json(json!({ "id": id, "username": format!("user{id}") })).into_response()
}

async fn list_products(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(res) = enter(&state, &headers).await {
        return res;
    }
    Json(json!([
        { "id": 1, "name": "Laptop Pro", "price": 1299.99 },
        { "id": 2, "name": "Wireless Mouse", "price": 29.99 },
    ]))
    .into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderBody {
    user_id: u64,
    items: Vec<Value>,
    total_amount: f64,
}

async fn create_order(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(res) = enter(&state, &headers).await {
        return res;
    }
    let order: OrderBody = match parse(&body) {
        Ok(v) => v,
        Err(res) => return res,
    };
    if order.items.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "empty order" }))).into_response();
    }

    let id = state.stats.next_order_id();
    (
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "userId": order.user_id,
            "totalAmount": order.total_amount,
            "status": "CREATED",
        })),
    )
        .into_response()
}

async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    if let Some(res) = enter(&state, &headers).await {
        return res;
    }
    Json(json!({ "id": id, "status": "CREATED" })).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentBody {
    order_id: u64,
    amount: f64,
}

async fn process_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(res) = enter(&state, &headers).await {
        return res;
    }
    match parse::<PaymentBody>(&body) {
        Ok(p) => Json(json!({ "orderId": p.order_id, "amount": p.amount, "status": "APPROVED" }))
            .into_response(),
        Err(res) => res,
    }
}

async fn product_stock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    if let Some(res) = enter(&state, &headers).await {
        return res;
    }
    Json(json!({ "productId": id, "available": 42 })).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationBody {
    user_id: u64,
    #[serde(rename = "type")]
    kind: String,
}

async fn send_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(res) = enter(&state, &headers).await {
        return res;
    }
    match parse::<NotificationBody>(&body) {
        Ok(n) => Json(json!({ "userId": n.user_id, "type": n.kind, "sent": true })).into_response(),
        Err(res) => res,
    }
}
