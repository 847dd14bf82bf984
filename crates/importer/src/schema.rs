//! Named, ordered column schemas.

use crate::columns::{self, ColumnParser};

pub const SIZE_UPC_PAIRS: usize = 15;

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub parser: ColumnParser,
}

impl Column {
    pub fn new(name: impl Into<String>, parser: ColumnParser) -> Self {
        Self {
            name: name.into(),
            parser,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    name: &'static str,
    columns: Vec<Column>,
}

impl Schema {
    pub const INVENTORY: &'static str = "Inventory";
    pub const PRODUCT: &'static str = "Product";

    pub fn new(name: &'static str, columns: Vec<Column>) -> Self {
        Self { name, columns }
    }

    pub fn inventory() -> Self {
        Self::new(
            Self::INVENTORY,
            vec![
                Column::new("UPC", columns::upc),
                Column::new("QUANTITY", columns::quantity),
                Column::new("DATE", columns::date),
            ],
        )
    }

    pub fn product() -> Self {
        let mut cols = vec![
            Column::new("SEASON", columns::text),
            Column::new("STYLE NUMBER", columns::style_number),
            Column::new("NAME", columns::text),
            Column::new("COLOR", columns::text),
            Column::new("COLOR CODE", columns::optional_text),
            Column::new("DEPARTMENT", columns::text),
            Column::new("DIVISION", columns::text),
            Column::new("ADDITIONAL SEASONS", columns::text),
            Column::new("WHOLESALE USD", columns::currency),
            Column::new("RETAIL USD", columns::currency),
            Column::new("CATEGORY", columns::text),
            Column::new("SUBCATEGORY", columns::text),
            Column::new("AVAILABLE START", columns::date),
            Column::new("AVAILABLE END", columns::date),
            Column::new("DESCRIPTION", columns::text),
            Column::new("ARCHIVED", columns::yes_no),
            Column::new("BRAND ID", columns::text),
            Column::new("WHOLESALE CAD", columns::currency),
            Column::new("RETAIL CAD", columns::currency),
        ];
        for n in 1..=SIZE_UPC_PAIRS {
            cols.push(Column::new(size_header(n), columns::optional_text));
            cols.push(Column::new(upc_header(n), columns::optional_upc));
        }
        Self::new(Self::PRODUCT, cols)
    }

    /// Look a schema up by export type token.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            Self::INVENTORY => Some(Self::inventory()),
            Self::PRODUCT => Some(Self::product()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, header: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == header)
    }
}

pub fn size_header(n: usize) -> String {
    format!("SIZE {n}")
}

pub fn upc_header(n: usize) -> String {
    format!("UPC {n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_are_found_by_name() {
        assert_eq!(Schema::by_name("Inventory").unwrap().name(), "Inventory");
        assert_eq!(Schema::by_name("Product").unwrap().name(), "Product");
        assert!(Schema::by_name("Order").is_none());
    }

    #[test]
    fn product_schema_has_fifteen_size_upc_pairs() {
        let schema = Schema::product();
        assert!(schema.column("SIZE 15").is_some());
        assert!(schema.column("UPC 15").is_some());
        assert!(schema.column("UPC 16").is_none());
        assert_eq!(schema.columns().len(), 19 + 2 * SIZE_UPC_PAIRS);
    }

    #[test]
    fn inventory_schema_is_ordered() {
        let names: Vec<_> = Schema::inventory()
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, ["UPC", "QUANTITY", "DATE"]);
    }
}
