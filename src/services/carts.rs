use crate::{
    entities::{cart, cart_item, Cart, CartItem, CartModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use strum::EnumString;
use tracing::{info, instrument};
use uuid::Uuid;

/// Owns the mutable per-user cart.
///
/// One cart per user, one line item per product. Every mutation runs in a
/// transaction and bumps the cart's `version` with an optimistic write guard,
/// so two concurrent mutations of the same cart cannot silently lose one
/// update.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Input for adding an item to the cart.
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub name: String,
    pub quantity: Option<i32>,
    pub image: String,
    pub price: Decimal,
}

/// Requested direction for a quantity update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum QuantityAction {
    Increment,
    Decrement,
}

/// Outcome of a quantity update. `Floored` means a decrement would have gone
/// below one; the line item is left untouched.
#[derive(Debug)]
pub enum QuantityUpdate {
    Updated(CartWithItems),
    Floored,
}

/// Cart with its line items.
#[derive(Debug, Serialize)]
pub struct CartWithItems {
    pub cart: CartModel,
    pub items: Vec<cart_item::Model>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Retrieves the user's cart with all line items.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = self.find_cart(&*self.db, user_id).await?;
        let items = self.load_items(&*self.db, cart.id).await?;
        Ok(CartWithItems { cart, items })
    }

    /// Adds a product to the cart, or bumps its quantity when the product is
    /// already present.
    ///
    /// A line item per product is the invariant: adding an existing product
    /// increments its quantity by one and ignores any quantity in the
    /// request. The cart row itself is created on first add.
    #[instrument(skip(self, input), fields(product_id = %product_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;

        let (cart, cart_created) = match self.try_find_cart(&txn, user_id).await? {
            Some(cart) => (cart, false),
            None => {
                let now = Utc::now();
                let cart = cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    version: Set(0),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                (cart.insert(&txn).await?, true)
            }
        };

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        if let Some(item) = existing {
            let quantity = item.quantity + 1;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        } else {
            let now = Utc::now();
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product_id),
                name: Set(input.name),
                quantity: Set(initial_quantity(input.quantity)),
                unit_price: Set(self.resolve_unit_price(input.price)),
                image: Set(input.image),
                created_at: Set(now),
                updated_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        self.touch_cart(&txn, &cart).await?;
        txn.commit().await?;

        if cart_created {
            self.event_sender.send_or_log(Event::CartCreated(cart.id)).await;
        }
        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id,
            })
            .await;

        info!("Added product {} to cart {}", product_id, cart.id);
        self.get_cart(user_id).await
    }

    /// Increments or decrements a line item's quantity.
    ///
    /// `action` must be `increment` or `decrement`; anything else is a
    /// validation error. A decrement that would drop below one returns
    /// `QuantityUpdate::Floored` and leaves the cart untouched.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        action: &str,
    ) -> Result<QuantityUpdate, ServiceError> {
        let action = QuantityAction::from_str(action).map_err(|_| {
            ServiceError::ValidationError(format!(
                "action must be 'increment' or 'decrement', got '{}'",
                action
            ))
        })?;

        let txn = self.db.begin().await?;

        let cart = self.find_cart(&txn, user_id).await?;
        let item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not in cart", product_id))
            })?;

        let quantity = match action {
            QuantityAction::Increment => item.quantity + 1,
            QuantityAction::Decrement => {
                if item.quantity - 1 < 1 {
                    // Dropping the transaction rolls back; state is untouched.
                    return Ok(QuantityUpdate::Floored);
                }
                item.quantity - 1
            }
        };

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        item.update(&txn).await?;

        self.touch_cart(&txn, &cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemQuantityChanged {
                cart_id: cart.id,
                product_id,
            })
            .await;

        Ok(QuantityUpdate::Updated(self.get_cart(user_id).await?))
    }

    /// Removes a line item from the cart.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.find_cart(&txn, user_id).await?;
        let item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not in cart", product_id))
            })?;

        CartItem::delete_by_id(item.id).exec(&txn).await?;

        self.touch_cart(&txn, &cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                product_id,
            })
            .await;

        info!("Removed product {} from cart {}", product_id, cart.id);
        self.get_cart(user_id).await
    }

    /// Deletes every line item and bumps the cart version.
    ///
    /// Invoked by order placement when the `clear` cart policy is active.
    #[instrument(skip(conn))]
    pub(crate) async fn clear_cart_items(
        conn: &impl ConnectionTrait,
        cart: &CartModel,
    ) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(conn)
            .await?;
        Self::bump_version(conn, cart).await
    }

    /// Single seam for unit-price resolution on cart adds.
    ///
    /// The storefront currently accepts the caller-supplied price verbatim
    /// (flagged for product review); swapping this body for a catalog lookup
    /// changes the policy without touching the cart logic.
    fn resolve_unit_price(&self, claimed: Decimal) -> Decimal {
        claimed
    }

    async fn find_cart(
        &self,
        conn: &impl ConnectionTrait,
        user_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        self.try_find_cart(conn, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for user {} not found", user_id)))
    }

    async fn try_find_cart(
        &self,
        conn: &impl ConnectionTrait,
        user_id: Uuid,
    ) -> Result<Option<CartModel>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(conn)
            .await?)
    }

    async fn load_items(
        &self,
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        Ok(CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(conn)
            .await?)
    }

    async fn touch_cart(
        &self,
        conn: &impl ConnectionTrait,
        cart: &CartModel,
    ) -> Result<(), ServiceError> {
        Self::bump_version(conn, cart).await
    }

    async fn bump_version(
        conn: &impl ConnectionTrait,
        cart: &CartModel,
    ) -> Result<(), ServiceError> {
        let result = Cart::update_many()
            .col_expr(
                cart::Column::Version,
                Expr::col(cart::Column::Version).add(1),
            )
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::Id.eq(cart.id))
            .filter(cart::Column::Version.eq(cart.version))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(cart.id));
        }
        Ok(())
    }
}

fn initial_quantity(requested: Option<i32>) -> i32 {
    requested.filter(|q| *q >= 1).unwrap_or(1)
}
