//! `CommerceStore` capability and the remote records it exposes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: u64,
    pub product_id: u64,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    pub inventory_item_id: u64,
    /// Handle of the fulfillment service managing this variant.
    #[serde(default)]
    pub fulfillment_service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    #[serde(default)]
    pub product_type: String,
    /// Comma-separated tag list.
    #[serde(default)]
    pub tags: String,
}

impl Product {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.split(',').any(|t| t.trim() == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub inventory_item_id: u64,
    pub location_id: u64,
    #[serde(default)]
    pub available: Option<i64>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CommerceError {
    #[error("commerce api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("commerce transport error: {0}")]
    Transport(String),

    #[error("commerce response could not be decoded: {0}")]
    Decode(String),
}

impl CommerceError {
    pub fn is_transient(&self) -> bool {
        match self {
            CommerceError::Transport(_) => true,
            CommerceError::Api { status, .. } => *status == 429 || *status >= 500,
            CommerceError::Decode(_) => false,
        }
    }
}

/// Remote multi-tenant commerce API, bound to one shop.
///
/// Listings are page-numbered from 1; a page shorter than `limit` is the last.
pub trait CommerceStore: Send + Sync {
    fn variants(&self, page: u32, limit: u32) -> Result<Vec<Variant>, CommerceError>;

    fn products(&self, page: u32, limit: u32) -> Result<Vec<Product>, CommerceError>;

    fn inventory_levels(&self, location_id: u64, page: u32, limit: u32) -> Result<Vec<InventoryLevel>, CommerceError>;

    /// Set the absolute available quantity of an item at a location.
    fn set_inventory_level(
        &self,
        location_id: u64,
        inventory_item_id: u64,
        available: i64,
    ) -> Result<InventoryLevel, CommerceError>;

    fn update_product_type(&self, product_id: u64, product_type: &str) -> Result<(), CommerceError>;
}

impl<S: CommerceStore + ?Sized> CommerceStore for Arc<S> {
    fn variants(&self, page: u32, limit: u32) -> Result<Vec<Variant>, CommerceError> {
        (**self).variants(page, limit)
    }

    fn products(&self, page: u32, limit: u32) -> Result<Vec<Product>, CommerceError> {
        (**self).products(page, limit)
    }

    fn inventory_levels(&self, location_id: u64, page: u32, limit: u32) -> Result<Vec<InventoryLevel>, CommerceError> {
        (**self).inventory_levels(location_id, page, limit)
    }

    fn set_inventory_level(
        &self,
        location_id: u64,
        inventory_item_id: u64,
        available: i64,
    ) -> Result<InventoryLevel, CommerceError> {
        (**self).set_inventory_level(location_id, inventory_item_id, available)
    }

    fn update_product_type(&self, product_id: u64, product_type: &str) -> Result<(), CommerceError> {
        (**self).update_product_type(product_id, product_type)
    }
}
