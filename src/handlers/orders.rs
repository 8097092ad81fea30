use crate::handlers::common::{created_response, success_response};
use crate::{
    auth::{AdminUser, AuthenticatedUser},
    errors::ServiceError,
    services::{OrderResponse, PaymentConfirmation, PlaceOrderInput},
    AppState, ListQuery,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Creates the router for order endpoints
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(my_orders))
        .route("/add", post(place_order))
        .route("/list", get(list_orders))
        .route("/checkout", post(create_checkout_session))
        .route("/:id", get(get_order))
        .route("/:id/pay", put(mark_paid))
        .route("/:id/deliver", put(mark_delivered))
}

#[derive(Debug, Deserialize)]
struct OrderIdQuery {
    order_id: Uuid,
}

#[derive(Debug, Serialize)]
struct OrderListData {
    data: Vec<OrderResponse>,
    total: u64,
    page: u64,
    limit: u64,
}

#[derive(Debug, Serialize)]
struct CheckoutSessionData {
    url: String,
}

/// Place an order from the caller's current cart
async fn place_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.place_order(user.id, payload).await?;
    Ok(created_response(order))
}

/// Caller's own orders, newest first
async fn my_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Response, ServiceError> {
    let orders = state.services.orders.orders_for_user(user.id).await?;
    Ok(success_response(orders))
}

/// All orders, paginated (admin)
async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ListQuery>,
) -> Result<Response, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(query.page, query.limit)
        .await?;

    Ok(success_response(OrderListData {
        data: orders,
        total,
        page: query.page,
        limit: query.limit,
    }))
}

/// One order, visible to its owner or an administrator
async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(id).await?;

    if !user.admin && order.user_id != user.id {
        return Err(ServiceError::Forbidden(
            "order belongs to another user".to_string(),
        ));
    }

    Ok(success_response(order))
}

/// Manually mark an order paid (admin)
async fn mark_paid(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .mark_paid(id, PaymentConfirmation::default())
        .await?;
    Ok(success_response(order))
}

/// Mark a paid order delivered (admin)
async fn mark_delivered(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.mark_delivered(id).await?;
    Ok(success_response(order))
}

/// Exchange an order for a hosted payment session URL
async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<OrderIdQuery>,
) -> Result<Response, ServiceError> {
    let url = state
        .services
        .checkout
        .create_checkout_session(user.id, query.order_id)
        .await?;

    Ok(success_response(CheckoutSessionData { url }))
}
