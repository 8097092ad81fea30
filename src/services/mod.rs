pub mod carts;
pub mod checkout;
pub mod orders;

pub use carts::{AddItemInput, CartService, CartWithItems, QuantityUpdate};
pub use checkout::CheckoutService;
pub use orders::{OrderResponse, OrderService, PaymentConfirmation, PlaceOrderInput};
