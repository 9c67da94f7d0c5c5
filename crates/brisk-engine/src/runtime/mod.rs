//! Runtime support for generated code.
//!
//! This module provides the pieces the VM needs to give compiled code its
//! meaning:
//! - JavaScript values and objects
//! - Environment records
//! - Exceptions and error kinds
//! - The abstract operations (coercions, property access, iteration)
//! - The realm of builtins and the promise job queue

pub mod abstract_ops;
pub mod environment;
pub mod exception;
pub mod object;
pub mod promise;
pub mod realm;
pub mod value;

pub use exception::{ErrorKind, Exception, JsResult, Thrown};
pub use value::Value;
