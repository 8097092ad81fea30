use crate::handlers::common::{success_response, validate_input};
use crate::{
    auth::AuthenticatedUser,
    errors::ServiceError,
    services::{carts::QuantityUpdate, AddItemInput},
    AppState,
};
use axum::{
    extract::{Json, Query, State},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Creates the router for cart endpoints
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/add", post(add_item))
        .route("/quantity", put(update_quantity))
        .route("/item", delete(remove_item))
}

#[derive(Debug, Deserialize)]
struct ProductQuery {
    product_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
struct AddItemRequest {
    #[validate(length(min = 1))]
    name: String,
    #[validate(range(min = 1))]
    quantity: Option<i32>,
    #[validate(length(min = 1))]
    image: String,
    #[validate(custom = "validate_positive_price")]
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    action: String,
}

fn validate_positive_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("price must be greater than 0".into());
        Err(err)
    }
}

/// Current user's cart
async fn get_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Response, ServiceError> {
    let cart = state.services.cart.get_cart(user.id).await?;
    Ok(success_response(cart))
}

/// Add a product to the cart (or bump its quantity if already present)
async fn add_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ProductQuery>,
    Json(payload): Json<AddItemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let input = AddItemInput {
        name: payload.name,
        quantity: payload.quantity,
        image: payload.image,
        price: payload.price,
    };

    let cart = state
        .services
        .cart
        .add_item(user.id, query.product_id, input)
        .await?;

    Ok(success_response(cart))
}

/// Increment or decrement a line item's quantity
async fn update_quantity(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ProductQuery>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<Response, ServiceError> {
    let update = state
        .services
        .cart
        .update_quantity(user.id, query.product_id, &payload.action)
        .await?;

    // A decrement below one reports the floor sentinel instead of mutating
    // or removing the line.
    match update {
        QuantityUpdate::Updated(cart) => Ok(success_response(cart)),
        QuantityUpdate::Floored => Ok(success_response(serde_json::json!(0))),
    }
}

/// Remove a line item from the cart
async fn remove_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ProductQuery>,
) -> Result<Response, ServiceError> {
    let cart = state
        .services
        .cart
        .remove_item(user.id, query.product_id)
        .await?;

    Ok(success_response(cart))
}
