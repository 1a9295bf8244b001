//! Shopping cart scoped to a single franchise.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: u64,
    pub quantity: u32,
}

impl CartItem {
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        unit_price_cents: u64,
        quantity: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            unit_price_cents,
            quantity,
        }
    }

    #[must_use]
    pub fn subtotal_cents(&self) -> u64 {
        self.unit_price_cents.saturating_mul(u64::from(self.quantity))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    franchise_id: Option<String>,
    items: Vec<CartItem>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn franchise_id(&self) -> Option<&str> {
        self.franchise_id.as_deref()
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add `item` from `franchise_id`, merging quantities for a product already
    /// in the cart. An item from another franchise starts a new cart.
    pub fn add_item(&mut self, franchise_id: &str, item: CartItem) {
        if item.quantity == 0 {
            return;
        }
        if self.franchise_id.as_deref() != Some(franchise_id) {
            self.items.clear();
            self.franchise_id = Some(franchise_id.to_string());
        }

        match self
            .items
            .iter_mut()
            .find(|existing| existing.product_id == item.product_id)
        {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
                existing.unit_price_cents = item.unit_price_cents;
                existing.name = item.name;
            }
            None => self.items.push(item),
        }
    }

    /// Set the quantity of a product; `0` removes it. Returns false if the
    /// product is not in the cart.
    pub fn set_quantity(&mut self, product_id: &str, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove_item(product_id);
        }
        match self.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(item) => {
                item.quantity = quantity;
                true
            }
            None => false,
        }
    }

    pub fn remove_item(&mut self, product_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.product_id != product_id);
        let removed = self.items.len() != before;
        if self.items.is_empty() {
            self.franchise_id = None;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.franchise_id = None;
    }

    #[must_use]
    pub fn total_cents(&self) -> u64 {
        self.items
            .iter()
            .fold(0_u64, |total, item| total.saturating_add(item.subtotal_cents()))
    }

    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0_u32, |count, item| count.saturating_add(item.quantity))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::store::{JsonFilePersistence, Store};

    fn burger(quantity: u32) -> CartItem {
        CartItem::new("p-burger", "Burger", 1_250, quantity)
    }

    #[test]
    fn add_item_merges_quantities() {
        let mut cart = Cart::new();
        cart.add_item("fr-1", burger(1));
        cart.add_item("fr-1", burger(2));
        cart.add_item("fr-1", CartItem::new("p-fries", "Fries", 400, 1));

        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.total_cents(), 3 * 1_250 + 400);
        assert_eq!(cart.franchise_id(), Some("fr-1"));
    }

    #[test]
    fn other_franchise_replaces_cart() {
        let mut cart = Cart::new();
        cart.add_item("fr-1", burger(2));
        cart.add_item("fr-2", CartItem::new("p-pizza", "Pizza", 900, 1));

        assert_eq!(cart.franchise_id(), Some("fr-2"));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.total_cents(), 900);
    }

    #[test]
    fn set_quantity_zero_removes() {
        let mut cart = Cart::new();
        cart.add_item("fr-1", burger(2));
        assert!(cart.set_quantity("p-burger", 5));
        assert_eq!(cart.item_count(), 5);
        assert!(cart.set_quantity("p-burger", 0));
        assert!(cart.is_empty());
        assert_eq!(cart.franchise_id(), None);
        assert!(!cart.set_quantity("p-missing", 1));
    }

    #[test]
    fn zero_quantity_add_is_ignored() {
        let mut cart = Cart::new();
        cart.add_item("fr-1", burger(0));
        assert!(cart.is_empty());
        assert_eq!(cart.franchise_id(), None);
    }

    #[test]
    fn clear_empties_cart() {
        let mut cart = Cart::new();
        cart.add_item("fr-1", burger(1));
        cart.clear();
        assert_eq!(cart, Cart::default());
    }

    #[test]
    fn cart_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cart.json");

        let store = Store::with_persistence(Cart::new(), JsonFilePersistence::new(&path));
        store.update(|cart| cart.add_item("fr-1", burger(3)));

        let reloaded = Store::with_persistence(Cart::new(), JsonFilePersistence::new(&path));
        assert_eq!(reloaded.get().item_count(), 3);
        assert_eq!(reloaded.get().franchise_id(), Some("fr-1"));
    }
}
