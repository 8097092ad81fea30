mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::{
    errors::ServiceError,
    services::{carts::QuantityUpdate, AddItemInput},
};
use uuid::Uuid;

fn add_input(name: &str, quantity: Option<i32>, price: rust_decimal::Decimal) -> AddItemInput {
    AddItemInput {
        name: name.to_string(),
        quantity,
        image: format!("https://img.example.com/{}.png", name),
        price,
    }
}

#[tokio::test]
async fn first_add_creates_cart_with_single_line() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;
    let product = app.seed_product("keyboard", dec!(10), 5).await;

    let cart = app
        .state
        .services
        .cart
        .add_item(user.id, product.id, add_input("keyboard", None, dec!(10)))
        .await
        .expect("add should succeed");

    assert_eq!(cart.cart.user_id, user.id);
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].product_id, product.id);
    assert_eq!(cart.items[0].quantity, 1);
    assert_eq!(cart.items[0].unit_price, dec!(10));
}

#[tokio::test]
async fn adding_same_product_twice_increments_one_line() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;
    let product = app.seed_product("keyboard", dec!(10), 5).await;

    let service = &app.state.services.cart;
    service
        .add_item(user.id, product.id, add_input("keyboard", None, dec!(10)))
        .await
        .unwrap();
    // The second request's quantity is ignored; an existing line is bumped
    // by exactly one.
    let cart = service
        .add_item(user.id, product.id, add_input("keyboard", Some(5), dec!(10)))
        .await
        .unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
}

#[tokio::test]
async fn add_honors_requested_quantity_for_new_lines() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;
    let product = app.seed_product("mouse", dec!(5), 9).await;

    let cart = app
        .state
        .services
        .cart
        .add_item(user.id, product.id, add_input("mouse", Some(3), dec!(5)))
        .await
        .unwrap();

    assert_eq!(cart.items[0].quantity, 3);
}

#[tokio::test]
async fn distinct_products_get_distinct_lines() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;
    let keyboard = app.seed_product("keyboard", dec!(10), 5).await;
    let mouse = app.seed_product("mouse", dec!(5), 9).await;

    let service = &app.state.services.cart;
    service
        .add_item(user.id, keyboard.id, add_input("keyboard", None, dec!(10)))
        .await
        .unwrap();
    let cart = service
        .add_item(user.id, mouse.id, add_input("mouse", Some(2), dec!(5)))
        .await
        .unwrap();

    assert_eq!(cart.items.len(), 2);
}

#[tokio::test]
async fn get_cart_for_user_without_cart_is_not_found() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;

    let err = app
        .state
        .services
        .cart
        .get_cart(user.id)
        .await
        .expect_err("no cart row should exist yet");

    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn increment_and_decrement_adjust_quantity() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;
    let product = app.seed_product("keyboard", dec!(10), 5).await;

    let service = &app.state.services.cart;
    service
        .add_item(user.id, product.id, add_input("keyboard", Some(2), dec!(10)))
        .await
        .unwrap();

    let update = service
        .update_quantity(user.id, product.id, "increment")
        .await
        .unwrap();
    let cart = assert_matches!(update, QuantityUpdate::Updated(cart) => cart);
    assert_eq!(cart.items[0].quantity, 3);

    let update = service
        .update_quantity(user.id, product.id, "decrement")
        .await
        .unwrap();
    let cart = assert_matches!(update, QuantityUpdate::Updated(cart) => cart);
    assert_eq!(cart.items[0].quantity, 2);
}

#[tokio::test]
async fn decrement_at_quantity_one_floors_without_mutation() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;
    let product = app.seed_product("keyboard", dec!(10), 5).await;

    let service = &app.state.services.cart;
    service
        .add_item(user.id, product.id, add_input("keyboard", None, dec!(10)))
        .await
        .unwrap();

    let update = service
        .update_quantity(user.id, product.id, "decrement")
        .await
        .unwrap();
    assert_matches!(update, QuantityUpdate::Floored);

    // The line item survives at quantity one.
    let cart = service.get_cart(user.id).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 1);
}

#[tokio::test]
async fn unknown_action_is_a_validation_error() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;
    let product = app.seed_product("keyboard", dec!(10), 5).await;

    let service = &app.state.services.cart;
    service
        .add_item(user.id, product.id, add_input("keyboard", None, dec!(10)))
        .await
        .unwrap();

    let err = service
        .update_quantity(user.id, product.id, "remove")
        .await
        .expect_err("action should be rejected");

    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn quantity_update_for_missing_line_is_not_found() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;
    let product = app.seed_product("keyboard", dec!(10), 5).await;

    let service = &app.state.services.cart;
    service
        .add_item(user.id, product.id, add_input("keyboard", None, dec!(10)))
        .await
        .unwrap();

    let err = service
        .update_quantity(user.id, Uuid::new_v4(), "increment")
        .await
        .expect_err("missing line should be rejected");

    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn remove_item_deletes_only_that_line() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;
    let keyboard = app.seed_product("keyboard", dec!(10), 5).await;
    let mouse = app.seed_product("mouse", dec!(5), 9).await;

    let service = &app.state.services.cart;
    service
        .add_item(user.id, keyboard.id, add_input("keyboard", None, dec!(10)))
        .await
        .unwrap();
    service
        .add_item(user.id, mouse.id, add_input("mouse", None, dec!(5)))
        .await
        .unwrap();

    let cart = service.remove_item(user.id, keyboard.id).await.unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].product_id, mouse.id);
}

#[tokio::test]
async fn remove_missing_item_is_not_found() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;
    let product = app.seed_product("keyboard", dec!(10), 5).await;

    let service = &app.state.services.cart;
    service
        .add_item(user.id, product.id, add_input("keyboard", None, dec!(10)))
        .await
        .unwrap();

    let err = service
        .remove_item(user.id, Uuid::new_v4())
        .await
        .expect_err("unknown product should be rejected");

    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn cart_version_advances_with_each_mutation() {
    let app = TestApp::new().await;
    let user = app.seed_user("ada", "ada@example.com", false).await;
    let product = app.seed_product("keyboard", dec!(10), 5).await;

    let service = &app.state.services.cart;
    let first = service
        .add_item(user.id, product.id, add_input("keyboard", None, dec!(10)))
        .await
        .unwrap();
    let second = service
        .add_item(user.id, product.id, add_input("keyboard", None, dec!(10)))
        .await
        .unwrap();

    assert!(second.cart.version > first.cart.version);
}
