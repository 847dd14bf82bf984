//! In-memory `CommerceStore` used by tests and dry runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use crate::commerce::{CommerceError, CommerceStore, InventoryLevel, Product, Variant};

#[derive(Debug, Default)]
struct State {
    variants: Vec<Variant>,
    products: Vec<Product>,
    /// (location, item) -> available
    levels: BTreeMap<(u64, u64), Option<i64>>,
    level_writes: Vec<InventoryLevel>,
    product_updates: Vec<(u64, String)>,
    failing_items: HashSet<u64>,
    list_calls: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryCommerceStore {
    state: Mutex<State>,
}

impl InMemoryCommerceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, CommerceError> {
        self.state
            .lock()
            .map_err(|_| CommerceError::Transport("commerce store lock poisoned".to_string()))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn add_variant(&self, variant: Variant) {
        self.with_state(|s| s.variants.push(variant));
    }

    pub fn add_product(&self, product: Product) {
        self.with_state(|s| s.products.push(product));
    }

    pub fn set_level(&self, location_id: u64, inventory_item_id: u64, available: Option<i64>) {
        self.with_state(|s| {
            s.levels.insert((location_id, inventory_item_id), available);
        });
    }

    pub fn level(&self, location_id: u64, inventory_item_id: u64) -> Option<i64> {
        self.with_state(|s| s.levels.get(&(location_id, inventory_item_id)).copied().flatten())
    }

    pub fn product(&self, product_id: u64) -> Option<Product> {
        self.with_state(|s| s.products.iter().find(|p| p.id == product_id).cloned())
    }

    /// Every successful inventory write, in order.
    pub fn writes(&self) -> Vec<InventoryLevel> {
        self.with_state(|s| s.level_writes.clone())
    }

    pub fn product_updates(&self) -> Vec<(u64, String)> {
        self.with_state(|s| s.product_updates.clone())
    }

    /// Number of listing pages served so far.
    pub fn list_calls(&self) -> usize {
        self.with_state(|s| s.list_calls)
    }

    /// Make every write to `inventory_item_id` fail with a server error.
    pub fn fail_writes_for(&self, inventory_item_id: u64) {
        self.with_state(|s| {
            s.failing_items.insert(inventory_item_id);
        });
    }
}

fn page_of<T: Clone>(items: &[T], page: u32, limit: u32) -> Vec<T> {
    let start = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
    items.iter().skip(start).take(limit as usize).cloned().collect()
}

impl CommerceStore for InMemoryCommerceStore {
    fn variants(&self, page: u32, limit: u32) -> Result<Vec<Variant>, CommerceError> {
        let mut state = self.lock()?;
        state.list_calls += 1;
        Ok(page_of(&state.variants, page, limit))
    }

    fn products(&self, page: u32, limit: u32) -> Result<Vec<Product>, CommerceError> {
        let mut state = self.lock()?;
        state.list_calls += 1;
        Ok(page_of(&state.products, page, limit))
    }

    fn inventory_levels(&self, location_id: u64, page: u32, limit: u32) -> Result<Vec<InventoryLevel>, CommerceError> {
        let mut state = self.lock()?;
        state.list_calls += 1;
        let levels: Vec<InventoryLevel> = state
            .levels
            .iter()
            .filter(|((location, _), _)| *location == location_id)
            .map(|(&(location_id, inventory_item_id), &available)| InventoryLevel {
                inventory_item_id,
                location_id,
                available,
            })
            .collect();
        Ok(page_of(&levels, page, limit))
    }

    fn set_inventory_level(
        &self,
        location_id: u64,
        inventory_item_id: u64,
        available: i64,
    ) -> Result<InventoryLevel, CommerceError> {
        let mut state = self.lock()?;
        if state.failing_items.contains(&inventory_item_id) {
            return Err(CommerceError::Api {
                status: 500,
                message: format!("write to item {inventory_item_id} rejected"),
            });
        }
        state.levels.insert((location_id, inventory_item_id), Some(available));
        let level = InventoryLevel {
            inventory_item_id,
            location_id,
            available: Some(available),
        };
        state.level_writes.push(level.clone());
        Ok(level)
    }

    fn update_product_type(&self, product_id: u64, product_type: &str) -> Result<(), CommerceError> {
        let mut state = self.lock()?;
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| CommerceError::Api {
                status: 404,
                message: format!("product {product_id} not found"),
            })?;
        product.product_type = product_type.to_string();
        state.product_updates.push((product_id, product_type.to_string()));
        Ok(())
    }
}
