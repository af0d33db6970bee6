pub mod auth;
pub mod cart;
pub mod checkout;
pub mod notifications;
pub mod orders;

pub use cart::*;
pub use checkout::*;
pub use notifications::*;
pub use orders::*;
