use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{Request, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{Order, OrderStatus, PaymentHandle, Product};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ShopError;
use crate::orchestrator::ShopOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub shop: Arc<ShopOrchestrator>,
}

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct MakeOrderRequest {
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct PaymentCallback {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub product_id: i64,
    pub name: String,
    pub price: BigDecimal,
    pub stock: i32,
}

#[derive(Debug, Serialize)]
pub struct MakeOrderResponse {
    pub order_id: i64,
    pub payment_handle: Option<PaymentHandle>,
    pub status: OrderStatus,
    pub sum: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub sum: BigDecimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub payment_handle: Option<PaymentHandle>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            product_id: product.id,
            name: product.name,
            price: product.price,
            stock: product.stock,
        }
    }
}

impl From<Order> for MakeOrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            payment_handle: order.payment_handle,
            status: order.status,
            sum: order.sum,
            created_at: order.created_at,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            product_id: order.product_id,
            quantity: order.quantity,
            sum: order.sum,
            status: order.status,
            created_at: order.created_at,
            payment_handle: order.payment_handle,
        }
    }
}

/// Transport view of a [`ShopError`]. Internal detail stays in the logs.
#[derive(Debug)]
pub struct ApiError(ShopError);

impl From<ShopError> for ApiError {
    fn from(err: ShopError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let (status, message) = match &self.0 {
            ShopError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            ShopError::ProductNotFound(_) | ShopError::OrderNotFound(_) => {
                (StatusCode::NOT_FOUND, self.0.to_string())
            }
            ShopError::InsufficientStock { .. } | ShopError::AlreadyExists => {
                (StatusCode::CONFLICT, self.0.to_string())
            }
            ShopError::DeadlineExceeded(_) => {
                tracing::warn!(error = %self.0, "request exceeded transaction deadline");
                (StatusCode::GATEWAY_TIMEOUT, "request timed out".to_string())
            }
            ShopError::Internal(_) => {
                tracing::error!(error = %self.0, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let code = match self.0 {
            ShopError::DeadlineExceeded(_) => "deadline_exceeded",
            _ => kind.as_str(),
        };

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        invalid(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        invalid(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        invalid(rejection.body_text())
    }
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError(ShopError::InvalidArgument(message.into()))
}

pub fn validate_list_products(query: &ListProductsQuery) -> Result<(i32, i32), ApiError> {
    // An absent limit is forwarded as 0 and resolved to the store's page size.
    let limit = match query.limit {
        Some(limit) if limit <= 0 => return Err(invalid("limit must be positive")),
        Some(limit) => limit,
        None => 0,
    };
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(invalid("offset cannot be negative"));
    }
    Ok((limit, offset))
}

pub fn validate_order_request(request: &MakeOrderRequest) -> Result<(), ApiError> {
    if request.product_id <= 0 {
        return Err(invalid("product_id is required"));
    }
    if request.quantity <= 0 {
        return Err(invalid("quantity must be positive"));
    }
    if request.user_id <= 0 {
        return Err(invalid("user_id is required"));
    }
    Ok(())
}

fn require_positive(value: i64, field: &str) -> Result<i64, ApiError> {
    if value <= 0 {
        return Err(invalid(format!("{} is required", field)));
    }
    Ok(value)
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:product_id", get(get_product_info))
        .route("/orders", post(make_order))
        .route("/orders/:order_id/payment", post(confirm_payment))
        .route("/users/:user_id/orders", get(get_orders_history))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "request",
                request_id = %Uuid::new_v4(),
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn list_products(
    State(state): State<AppState>,
    query: Result<Query<ListProductsQuery>, QueryRejection>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let Query(query) = query?;
    let (limit, offset) = validate_list_products(&query)?;
    let products = state.shop.list_products(limit, offset).await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

pub async fn get_product_info(
    State(state): State<AppState>,
    product_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ProductResponse>, ApiError> {
    let Path(product_id) = product_id?;
    let product_id = require_positive(product_id, "product_id")?;
    let product = state.shop.get_product(product_id).await?;
    Ok(Json(product.into()))
}

pub async fn make_order(
    State(state): State<AppState>,
    request: Result<Json<MakeOrderRequest>, JsonRejection>,
) -> Result<Json<MakeOrderResponse>, ApiError> {
    let Json(request) = request?;
    validate_order_request(&request)?;
    let order = state
        .shop
        .make_order(request.user_id, request.product_id, request.quantity)
        .await?;
    Ok(Json(order.into()))
}

pub async fn get_orders_history(
    State(state): State<AppState>,
    user_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let Path(user_id) = user_id?;
    let user_id = require_positive(user_id, "user_id")?;
    let orders = state.shop.get_order_history(user_id).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    order_id: Result<Path<i64>, PathRejection>,
    callback: Result<Json<PaymentCallback>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(order_id) = order_id?;
    let Json(callback) = callback?;
    let order_id = require_positive(order_id, "order_id")?;
    state.shop.confirm_payment(order_id, callback.success).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_limit_defers_to_store_default() {
        let query = ListProductsQuery { limit: None, offset: None };
        assert_eq!(validate_list_products(&query).unwrap(), (0, 0));
    }

    #[test]
    fn explicit_bad_paging_is_rejected() {
        let zero = ListProductsQuery { limit: Some(0), offset: None };
        assert!(validate_list_products(&zero).is_err());

        let negative_offset = ListProductsQuery { limit: Some(5), offset: Some(-1) };
        assert!(validate_list_products(&negative_offset).is_err());
    }

    #[test]
    fn order_request_needs_positive_fields() {
        let ok = MakeOrderRequest { user_id: 1, product_id: 2, quantity: 3 };
        assert!(validate_order_request(&ok).is_ok());

        let no_user = MakeOrderRequest { user_id: 0, ..ok };
        assert!(validate_order_request(&no_user).is_err());

        let no_quantity = MakeOrderRequest { quantity: -1, ..ok };
        assert!(validate_order_request(&no_quantity).is_err());
    }

    #[test]
    fn non_positive_path_ids_are_invalid_arguments() {
        assert_eq!(require_positive(4, "order_id").unwrap(), 4);
        let err = require_positive(0, "order_id").unwrap_err();
        assert!(matches!(&err.0, ShopError::InvalidArgument(msg) if msg == "order_id is required"));
    }
}
