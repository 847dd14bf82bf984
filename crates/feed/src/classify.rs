//! Filename classification.
//!
//! Export files are named `{14 digits}.{PREFIX}_{Type}Extract_{Tenant}.csv`,
//! with a case-insensitive extension. Anything else is not an export.

use regex::Regex;
use serde::{Deserialize, Serialize};

use stocksync_core::TenantName;

pub const DEFAULT_PREFIX: &str = "SHPFY";

/// Kind of export a file carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExportType {
    Inventory,
    Product,
    Other(String),
}

impl ExportType {
    pub fn as_str(&self) -> &str {
        match self {
            ExportType::Inventory => "Inventory",
            ExportType::Product => "Product",
            ExportType::Other(token) => token,
        }
    }
}

impl From<String> for ExportType {
    fn from(token: String) -> Self {
        match token.as_str() {
            "Inventory" => ExportType::Inventory,
            "Product" => ExportType::Product,
            _ => ExportType::Other(token),
        }
    }
}

impl From<ExportType> for String {
    fn from(value: ExportType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ExportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub export_type: ExportType,
    pub tenant: TenantName,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("export type or tenant not found in filename: {filename}")]
pub struct ClassificationError {
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    pattern: Regex,
}

impl Classifier {
    pub fn new(prefix: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"^\d{{14}}\.{}_(?P<export_type>[A-Za-z]+)Extract_(?P<tenant>[A-Za-z]+)\.(?i:csv)$",
            regex::escape(prefix)
        ))?;
        Ok(Self { pattern })
    }

    pub fn classify(&self, filename: &str) -> Result<Classification, ClassificationError> {
        let mismatch = || ClassificationError {
            filename: filename.to_string(),
        };
        let caps = self.pattern.captures(filename).ok_or_else(mismatch)?;
        let tenant = TenantName::new(&caps["tenant"]).map_err(|_| mismatch())?;
        Ok(Classification {
            export_type: ExportType::from(caps["export_type"].to_string()),
            tenant,
        })
    }
}
