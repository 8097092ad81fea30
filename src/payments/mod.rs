pub mod gateway;
pub mod webhook;

pub use gateway::{
    CheckoutLineItem, CreateSessionRequest, HostedCheckoutClient, HostedSession, PaymentGateway,
};
