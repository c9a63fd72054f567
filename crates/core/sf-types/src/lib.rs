//! Core data types for scriptflow.
//!
//! This crate provides:
//! - [`Value`] and [`Map`] - The host-side value model that scripts read and rewrite
//! - [`Record`] - The record envelope (identity fields plus key and value)
//! - [`RecordId`] - Immutable identity of a record, used for diagnostics
//! - [`FunctionKind`] - The two script entry points (`keyTransform`, `valueTransform`)

mod function;
mod record;
mod value;

pub use function::FunctionKind;
pub use record::{Record, RecordId};
pub use value::{Map, Value};
