//! Core traits for scriptflow.
//!
//! This crate defines the main abstractions:
//! - [`Transform`] - Trait for record transformations (scripted or native)
//! - [`ScriptEngine`] - Factory for one scripting dialect, selected by name
//! - [`ScriptRuntime`] - A live interpreter that compiles and invokes the
//!   `keyTransform` / `valueTransform` functions

pub mod engine;
pub mod transform;

pub use engine::*;
pub use transform::*;
