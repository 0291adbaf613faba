// app/src/services/mod.rs

pub mod auth_service;
pub mod delivery_service;
pub mod dispatch;
pub mod notification_service;
pub mod order_service;
pub mod payment_gateway;
pub mod payment_initiator;
pub mod payment_service;
pub mod webhook_signature;

pub use auth_service::TokenSigner;
pub use delivery_service::DeliveryService;
pub use dispatch::{Courier, CourierDispatcher, RosterDispatcher};
pub use notification_service::NotificationService;
pub use order_service::{OrderService, PaymentInitiation};
pub use payment_gateway::{MockGateway, PaymentGateway, StripeGateway};
pub use payment_initiator::{HttpInitiator, InProcessInitiator, PaymentInitiator};
pub use payment_service::{PaymentService, PaymentSettings};
