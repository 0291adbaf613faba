// app/src/models/mod.rs

//! Records owned by the services.

pub mod cart;
pub mod delivery;
pub mod notification;
pub mod order;
pub mod payment;

pub use cart::{Cart, CartItem, CartStatus, CheckoutReservation, NewCartItem};
pub use delivery::{Delivery, DeliveryStatus, Location};
pub use notification::{Notification, DELIVERED_MESSAGE};
pub use order::{DeliveryProgress, Order, OrderItem, OrderPage, PaymentStatus};
pub use payment::{CreatePaymentRequest, Payment, PaymentReceipt, PaymentState, PaymentView, Provider};
