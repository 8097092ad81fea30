use crate::{
    config::AppConfig,
    entities::{order_item, OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{CheckoutLineItem, CreateSessionRequest, PaymentGateway},
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{Order, OrderItem, User};

/// Exchanges an order for a hosted payment session with the external
/// processor.
///
/// This bridge never touches order state: the paid transition happens only
/// when the processor's signed confirmation arrives on the webhook path. A
/// buyer who abandons the hosted flow simply leaves the order unpaid.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            config,
        }
    }

    /// Creates a hosted payment session for an order and returns its URL.
    ///
    /// Line items are validated and converted to minor units before the
    /// processor is contacted; a bad order never leaves the building. The
    /// order id travels in the session metadata and is how the asynchronous
    /// confirmation finds its way back.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<String, ServiceError> {
        let user = User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;

        if user.email.trim().is_empty() {
            return Err(ServiceError::NotFound(format!(
                "User {} has no email address",
                user_id
            )));
        }

        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        if items.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "Order {} has no line items",
                order_id
            )));
        }

        let line_items = build_line_items(&items)?;

        let session = self
            .gateway
            .create_checkout_session(CreateSessionRequest {
                order_id,
                customer_email: user.email,
                currency: self.config.currency.clone(),
                line_items,
                success_url: self.config.checkout_success_url(),
                cancel_url: self.config.checkout_cancel_url(),
            })
            .await?;

        self.event_sender
            .send_or_log(Event::CheckoutSessionCreated {
                order_id,
                session_id: session.id.clone(),
            })
            .await;

        info!("Checkout session {} created for order {}", session.id, order_id);
        Ok(session.url)
    }
}

/// Validates order lines and converts them to processor line items with
/// amounts in minor units.
fn build_line_items(items: &[OrderItemModel]) -> Result<Vec<CheckoutLineItem>, ServiceError> {
    items
        .iter()
        .map(|item| {
            if item.name.trim().is_empty()
                || item.image.trim().is_empty()
                || item.unit_price <= Decimal::ZERO
                || item.quantity <= 0
            {
                return Err(ServiceError::ValidationError(
                    "missing required item information".to_string(),
                ));
            }

            Ok(CheckoutLineItem {
                name: item.name.clone(),
                image: item.image.clone(),
                unit_amount: to_minor_units(item.unit_price)?,
                quantity: i64::from(item.quantity),
            })
        })
        .collect()
}

/// Converts a major-unit decimal price into the smallest currency unit.
fn to_minor_units(price: Decimal) -> Result<i64, ServiceError> {
    (price * Decimal::from(100))
        .round()
        .to_i64()
        .filter(|amount| *amount > 0)
        .ok_or_else(|| {
            ServiceError::ValidationError("missing required item information".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn item(name: &str, image: &str, price: Decimal, quantity: i32) -> OrderItemModel {
        OrderItemModel {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            name: name.to_string(),
            quantity,
            unit_price: price,
            image: image.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn converts_prices_to_minor_units() {
        assert_eq!(to_minor_units(dec!(10)).unwrap(), 1000);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(19.99)).unwrap(), 1999);
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(to_minor_units(dec!(0)).is_err());
        assert!(to_minor_units(dec!(-5)).is_err());
    }

    #[test]
    fn builds_line_items_from_valid_order_lines() {
        let items = vec![
            item("Keyboard", "kb.png", dec!(10), 1),
            item("Mouse", "mouse.png", dec!(5), 2),
        ];

        let lines = build_line_items(&items).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].unit_amount, 1000);
        assert_eq!(lines[0].quantity, 1);
        assert_eq!(lines[1].unit_amount, 500);
        assert_eq!(lines[1].quantity, 2);
    }

    #[test]
    fn rejects_incomplete_line_items() {
        let no_name = vec![item("", "kb.png", dec!(10), 1)];
        let no_image = vec![item("Keyboard", "  ", dec!(10), 1)];
        let zero_price = vec![item("Keyboard", "kb.png", dec!(0), 1)];
        let zero_quantity = vec![item("Keyboard", "kb.png", dec!(10), 0)];

        for items in [no_name, no_image, zero_price, zero_quantity] {
            match build_line_items(&items) {
                Err(ServiceError::ValidationError(msg)) => {
                    assert_eq!(msg, "missing required item information");
                }
                other => panic!("expected validation error, got {:?}", other.map(|_| ())),
            }
        }
    }
}
