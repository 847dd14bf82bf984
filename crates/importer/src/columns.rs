//! Column parsers.
//!
//! A parser either yields a typed cell or rejects the whole row. Lenient
//! parsers (currency, dates, optional values) fall back to [`CellValue::Null`].

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use stocksync_core::Upc;

pub const DATE_FORMAT: &str = "%m/%d/%Y";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Date(NaiveDate),
    Bool(bool),
    Upc(Upc),
}

impl CellValue {
    pub fn as_upc(&self) -> Option<Upc> {
        match self {
            CellValue::Upc(upc) => Some(*upc),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// String form written to the cache. Dates keep the export's format.
    pub fn to_field_string(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Integer(n) => n.to_string(),
            CellValue::Decimal(d) => d.to_string(),
            CellValue::Date(d) => d.format(DATE_FORMAT).to_string(),
            CellValue::Bool(true) => "Y".to_string(),
            CellValue::Bool(false) => "N".to_string(),
            CellValue::Upc(upc) => upc.to_string(),
        }
    }
}

/// A cell that makes its row unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColumnError {
    #[error("invalid UPC: {0:?}")]
    Upc(String),

    #[error("invalid quantity: {0:?}")]
    Quantity(String),

    #[error("style number is not 6 digits: {0:?}")]
    StyleNumber(String),
}

pub type ColumnParser = fn(&str) -> Result<CellValue, ColumnError>;

pub fn upc(raw: &str) -> Result<CellValue, ColumnError> {
    Upc::parse(raw)
        .map(CellValue::Upc)
        .map_err(|_| ColumnError::Upc(raw.to_string()))
}

/// Blank or invalid barcodes are simply absent.
pub fn optional_upc(raw: &str) -> Result<CellValue, ColumnError> {
    Ok(Upc::parse(raw).map(CellValue::Upc).unwrap_or(CellValue::Null))
}

pub fn quantity(raw: &str) -> Result<CellValue, ColumnError> {
    raw.trim()
        .parse::<i64>()
        .map(CellValue::Integer)
        .map_err(|_| ColumnError::Quantity(raw.to_string()))
}

/// Non-digits are stripped; exactly six digits must remain.
pub fn style_number(raw: &str) -> Result<CellValue, ColumnError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 6 {
        return Err(ColumnError::StyleNumber(raw.to_string()));
    }
    digits
        .parse::<i64>()
        .map(CellValue::Integer)
        .map_err(|_| ColumnError::StyleNumber(raw.to_string()))
}

pub fn currency(raw: &str) -> Result<CellValue, ColumnError> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    Ok(Decimal::from_str(&cleaned)
        .map(CellValue::Decimal)
        .unwrap_or(CellValue::Null))
}

/// `MM/DD/YYYY`; anything else, blanks included, is null.
pub fn date(raw: &str) -> Result<CellValue, ColumnError> {
    let raw = raw.trim();
    let four_digit_year = raw
        .rsplit('/')
        .next()
        .is_some_and(|year| year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()));
    if !four_digit_year {
        return Ok(CellValue::Null);
    }
    Ok(NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map(CellValue::Date)
        .unwrap_or(CellValue::Null))
}

pub fn yes_no(raw: &str) -> Result<CellValue, ColumnError> {
    Ok(CellValue::Bool(raw.trim().eq_ignore_ascii_case("y")))
}

pub fn text(raw: &str) -> Result<CellValue, ColumnError> {
    Ok(CellValue::Text(raw.trim().to_string()))
}

/// Blank cells are null rather than empty text.
pub fn optional_text(raw: &str) -> Result<CellValue, ColumnError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Ok(CellValue::Null)
    } else {
        Ok(CellValue::Text(trimmed.to_string()))
    }
}
