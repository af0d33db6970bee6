pub mod cart_session;
pub mod cart_store;
pub mod checkout;
pub mod data_service;
pub mod order_service;
pub mod payment;
pub mod pricing;
pub mod sql_data_service;
pub mod wardrobe_service;

pub use cart_session::{CartSession, CartSessions, CheckoutState};
pub use cart_store::CartStore;
pub use checkout::{CheckoutError, CheckoutService, NotificationPolicy};
pub use data_service::{DataError, DataService, Identity};
pub use order_service::OrderService;
pub use payment::SimulatedPayment;
pub use sql_data_service::SqlDataService;
pub use wardrobe_service::WardrobeService;
