use crate::{
    config::{AppConfig, CartPolicy},
    entities::{
        cart, cart_item, order, order_item, Cart, CartItem, Order, OrderItem, OrderStatus, User,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::carts::CartService,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Builds immutable orders out of carts and walks them through the
/// `Created -> Paid -> Delivered` lifecycle.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

/// Shipping destination captured on the order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ShippingAddressInput {
    #[validate(length(min = 1, message = "address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
}

/// Input for placing an order from the caller's current cart.
#[derive(Debug, Deserialize, Validate)]
pub struct PlaceOrderInput {
    #[validate]
    pub shipping_address: ShippingAddressInput,
    #[validate(length(min = 1, message = "payment method is required"))]
    pub payment_method: String,
}

/// Payment outcome recorded when an order transitions to paid. Fields left
/// as `None` keep whatever the order already carries.
#[derive(Debug, Clone, Default)]
pub struct PaymentConfirmation {
    pub status: Option<String>,
    pub update_time: Option<String>,
    pub payer_email: Option<String>,
}

/// Payment-result sub-record surfaced on order responses.
#[derive(Debug, Serialize)]
pub struct PaymentResultResponse {
    pub status: Option<String>,
    pub update_time: Option<String>,
    pub email_address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub image: String,
}

/// Order as exposed over the API, with paid/delivered flags derived from the
/// status machine for client compatibility.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub order_items: Vec<OrderItemResponse>,
    pub shipping_address: ShippingAddressInput,
    pub payment_method: String,
    pub shipping_price: Decimal,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_result: Option<PaymentResultResponse>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Snapshots the user's current cart into a new order.
    ///
    /// Line items are copied verbatim - price, quantity, name, image - so
    /// later catalog price changes never move an existing order's total.
    /// `total_price = sum(price * quantity) + shipping_price` is computed
    /// here once and never recomputed.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<OrderResponse, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        let user = User::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;

        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart for user {} not found", user_id)))?;

        let cart_items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&txn)
            .await?;

        if cart_items.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let items_total: Decimal = cart_items
            .iter()
            .map(|item| item.unit_price * Decimal::from(item.quantity))
            .sum();
        let shipping_price = self.config.shipping_price;
        let total_price = items_total + shipping_price;

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user.id),
            username: Set(user.username.clone()),
            email: Set(user.email.clone()),
            shipping_address: Set(input.shipping_address.address.clone()),
            shipping_city: Set(input.shipping_address.city.clone()),
            shipping_postal_code: Set(input.shipping_address.postal_code.clone()),
            shipping_country: Set(input.shipping_address.country.clone()),
            payment_method: Set(input.payment_method.clone()),
            shipping_price: Set(shipping_price),
            total_price: Set(total_price),
            status: Set(OrderStatus::Created),
            paid_at: Set(None),
            payment_status: Set(None),
            payment_update_time: Set(None),
            payer_email: Set(None),
            delivered_at: Set(None),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order = order.insert(&txn).await?;

        for cart_item in &cart_items {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(cart_item.product_id),
                name: Set(cart_item.name.clone()),
                quantity: Set(cart_item.quantity),
                unit_price: Set(cart_item.unit_price),
                image: Set(cart_item.image.clone()),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        let cart_cleared = match self.config.cart_policy {
            CartPolicy::Clear => {
                CartService::clear_cart_items(&txn, &cart).await?;
                true
            }
            CartPolicy::Retain => false,
        };

        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderPlaced(order_id)).await;
        if cart_cleared {
            self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;
        }

        info!(
            "Placed order {} for user {} (total {})",
            order_id, user_id, total_price
        );
        self.fetch_response(&*self.db, order).await
    }

    /// Retrieves a single order with its items.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(&*self.db, order_id).await?;
        self.fetch_response(&*self.db, order).await
    }

    /// Returns all orders placed by a user, newest first. A user with no
    /// orders gets an empty list, not an error.
    #[instrument(skip(self))]
    pub async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        self.attach_items(orders).await
    }

    /// Administrative listing of all orders, paginated newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        if page < 1 {
            return Err(ServiceError::ValidationError(
                "page must be at least 1".to_string(),
            ));
        }
        if limit < 1 {
            return Err(ServiceError::ValidationError(
                "limit must be at least 1".to_string(),
            ));
        }

        let paginator = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;
        let responses = self.attach_items(orders).await?;

        Ok((responses, total))
    }

    /// Transitions an order to paid, recording the payment result.
    ///
    /// Idempotent: an order that is already paid (or delivered) is returned
    /// unchanged, keeping the original `paid_at`. This is what makes webhook
    /// redelivery harmless.
    #[instrument(skip(self, confirmation))]
    pub async fn mark_paid(
        &self,
        order_id: Uuid,
        confirmation: PaymentConfirmation,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(&*self.db, order_id).await?;

        if order.status.is_paid() {
            info!("Order {} already paid; skipping transition", order_id);
            return self.fetch_response(&*self.db, order).await;
        }

        let now = Utc::now();
        let mut update = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Paid))
            .col_expr(order::Column::PaidAt, Expr::value(Some(now)))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(now));

        if let Some(status) = confirmation.status {
            update = update.col_expr(order::Column::PaymentStatus, Expr::value(Some(status)));
        }
        if let Some(update_time) = confirmation.update_time {
            update = update.col_expr(
                order::Column::PaymentUpdateTime,
                Expr::value(Some(update_time)),
            );
        }
        if let Some(payer_email) = confirmation.payer_email {
            update = update.col_expr(order::Column::PayerEmail, Expr::value(Some(payer_email)));
        }

        let result = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(order.version))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        self.event_sender.send_or_log(Event::OrderPaid(order_id)).await;
        info!("Order {} marked paid", order_id);

        let order = self.find_order(&*self.db, order_id).await?;
        self.fetch_response(&*self.db, order).await
    }

    /// Transitions a paid order to delivered.
    ///
    /// Delivery of an unpaid order is refused by the status machine; marking
    /// an already-delivered order again is a no-op.
    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(&*self.db, order_id).await?;

        match order.status {
            OrderStatus::Created => {
                return Err(ServiceError::InvalidStatus(format!(
                    "Order {} cannot be delivered before it is paid",
                    order_id
                )));
            }
            OrderStatus::Delivered => {
                info!("Order {} already delivered; skipping transition", order_id);
                return self.fetch_response(&*self.db, order).await;
            }
            OrderStatus::Paid => {}
        }

        let now = Utc::now();
        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Delivered))
            .col_expr(order::Column::DeliveredAt, Expr::value(Some(now)))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(order.version))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        self.event_sender
            .send_or_log(Event::OrderDelivered(order_id))
            .await;
        info!("Order {} marked delivered", order_id);

        let order = self.find_order(&*self.db, order_id).await?;
        self.fetch_response(&*self.db, order).await
    }

    async fn find_order(
        &self,
        conn: &impl ConnectionTrait,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn fetch_response(
        &self,
        conn: &impl ConnectionTrait,
        order: order::Model,
    ) -> Result<OrderResponse, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(conn)
            .await?;
        Ok(model_to_response(order, items))
    }

    async fn attach_items(
        &self,
        orders: Vec<order::Model>,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                model_to_response(order, items)
            })
            .collect())
    }
}

fn model_to_response(order: order::Model, items: Vec<order_item::Model>) -> OrderResponse {
    let payment_result = if order.payment_status.is_some()
        || order.payment_update_time.is_some()
        || order.payer_email.is_some()
    {
        Some(PaymentResultResponse {
            status: order.payment_status,
            update_time: order.payment_update_time,
            email_address: order.payer_email,
        })
    } else {
        None
    };

    OrderResponse {
        id: order.id,
        user_id: order.user_id,
        username: order.username,
        email: order.email,
        order_items: items
            .into_iter()
            .map(|item| OrderItemResponse {
                product_id: item.product_id,
                name: item.name,
                quantity: item.quantity,
                price: item.unit_price,
                image: item.image,
            })
            .collect(),
        shipping_address: ShippingAddressInput {
            address: order.shipping_address,
            city: order.shipping_city,
            postal_code: order.shipping_postal_code,
            country: order.shipping_country,
        },
        payment_method: order.payment_method,
        shipping_price: order.shipping_price,
        total_price: order.total_price,
        status: order.status,
        is_paid: order.status.is_paid(),
        paid_at: order.paid_at,
        payment_result,
        is_delivered: order.status.is_delivered(),
        delivered_at: order.delivered_at,
        created_at: order.created_at,
    }
}
