//! Domain primitives shared by every stage of the sync engine.
//!
//! This crate has no infrastructure concerns: no IO, no clients, no clocks.

pub mod error;
pub mod id;
pub mod upc;
pub mod value_object;

pub use error::{DomainError, DomainResult};
pub use id::TenantName;
pub use upc::{is_valid_upc, Upc};
pub use value_object::ValueObject;
