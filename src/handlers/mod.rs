pub mod carts;
pub mod common;
pub mod orders;
pub mod payment_webhooks;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    payments::PaymentGateway,
    services::{CartService, CheckoutService, OrderService},
};
use std::sync::Arc;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let cart = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(db, gateway, event_sender, config));

        Self {
            cart,
            orders,
            checkout,
        }
    }
}
