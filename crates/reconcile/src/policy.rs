//! Per-tenant product category policies.
//!
//! A policy picks a product type from the product and whether any of its
//! variants is in stock. Policies are chosen per tenant through configuration.

use std::fmt::Debug;
use std::sync::Arc;

use serde::Deserialize;

use crate::commerce::Product;

pub trait CategoryPolicy: Send + Sync + Debug {
    /// Product type the product should have.
    fn product_type_for(&self, product: &Product, in_stock: bool) -> &str;
}

/// In-stock products go to one type, everything else to another. Products
/// carrying the exclusion tag always count as out of stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockCategoryPolicy {
    pub in_stock_type: String,
    pub out_of_stock_type: String,
    pub exclusion_tag: Option<String>,
}

impl CategoryPolicy for StockCategoryPolicy {
    fn product_type_for(&self, product: &Product, in_stock: bool) -> &str {
        let excluded = self
            .exclusion_tag
            .as_deref()
            .is_some_and(|tag| product.has_tag(tag));
        if in_stock && !excluded {
            &self.in_stock_type
        } else {
            &self.out_of_stock_type
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CategoryPolicyConfig {
    StockCategory {
        in_stock: String,
        out_of_stock: String,
        #[serde(default)]
        exclusion_tag: Option<String>,
    },
}

impl CategoryPolicyConfig {
    pub fn build(&self) -> Arc<dyn CategoryPolicy> {
        match self {
            CategoryPolicyConfig::StockCategory {
                in_stock,
                out_of_stock,
                exclusion_tag,
            } => Arc::new(StockCategoryPolicy {
                in_stock_type: in_stock.clone(),
                out_of_stock_type: out_of_stock.clone(),
                exclusion_tag: exclusion_tag.clone(),
            }),
        }
    }
}
