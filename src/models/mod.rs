pub mod cart;
pub mod checklist;
pub mod notification;
pub mod order;
pub mod wardrobe;

pub use cart::*;
pub use checklist::*;
pub use notification::*;
pub use order::*;
pub use wardrobe::*;
