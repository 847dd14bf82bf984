//! Schema-driven CSV ingestion.
//!
//! Exports are parsed lazily into typed rows ([`rows::CsvRows`]) according to
//! a named [`schema::Schema`]. Inventory rows fill the tenant's inventory
//! cache; product rows rebuild the tenant's SKU -> UPC map.

pub mod columns;
pub mod inventory;
pub mod product;
pub mod rows;
pub mod schema;

use stocksync_infra::StoreError;

pub use columns::{CellValue, ColumnError};
pub use inventory::{InventoryImporter, InventorySummary};
pub use product::{ProductImporter, ProductSummary};
pub use rows::{CsvRows, Row, RowStats};
pub use schema::{Column, Schema};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ImportError {
    pub fn is_transient(&self) -> bool {
        match self {
            ImportError::Store(e) => e.is_transient(),
            ImportError::UnknownSchema(_) => false,
        }
    }
}
