use uuid::Uuid;

use crate::models::CartItem;

/// Items staged for the active trip. Insertion order is kept for display only.
#[derive(Debug, Clone, Default)]
pub struct CartStore {
    items: Vec<CartItem>,
}

impl CartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `item` unless an entry with the same id is already present.
    /// Returns whether the cart changed.
    pub fn add_item(&mut self, item: CartItem) -> bool {
        if self.is_in_cart(item.id) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Removes every entry for `item_id`. Returns whether anything was removed.
    pub fn remove_item(&mut self, item_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != item_id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_in_cart(&self, item_id: Uuid) -> bool {
        self.items.iter().any(|item| item.id == item_id)
    }

    pub fn snapshot(&self) -> Vec<CartItem> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
