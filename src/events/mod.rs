use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the cart/order lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartItemQuantityChanged { cart_id: Uuid, product_id: Uuid },
    CartItemRemoved { cart_id: Uuid, product_id: Uuid },
    CartCleared(Uuid),

    // Order events
    OrderPlaced(Uuid),
    OrderPaid(Uuid),
    OrderDelivered(Uuid),

    // Checkout events
    CheckoutSessionCreated { order_id: Uuid, session_id: String },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing if the channel is closed.
    /// Event delivery is best-effort; request handling never depends on it.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!("Dropping event {:?}: {}", event, e);
        }
    }
}

/// Consumes lifecycle events and distributes them to interested parties.
///
/// Today every consumer is a structured-log line; the loop is the seam where
/// notification fan-out (email receipts, analytics) plugs in.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::CartCreated(cart_id) => {
                info!(%cart_id, "cart created");
            }
            Event::CartItemAdded {
                cart_id,
                product_id,
            } => {
                info!(%cart_id, %product_id, "cart item added");
            }
            Event::CartItemQuantityChanged {
                cart_id,
                product_id,
            } => {
                info!(%cart_id, %product_id, "cart item quantity changed");
            }
            Event::CartItemRemoved {
                cart_id,
                product_id,
            } => {
                info!(%cart_id, %product_id, "cart item removed");
            }
            Event::CartCleared(cart_id) => {
                info!(%cart_id, "cart cleared");
            }
            Event::OrderPlaced(order_id) => {
                info!(%order_id, "order placed");
            }
            Event::OrderPaid(order_id) => {
                info!(%order_id, "order paid");
            }
            Event::OrderDelivered(order_id) => {
                info!(%order_id, "order delivered");
            }
            Event::CheckoutSessionCreated {
                order_id,
                session_id,
            } => {
                info!(%order_id, %session_id, "checkout session created");
            }
        }
    }

    info!("Event processing loop stopped");
}
