//! # Peal Common Library
//!
//! Shared code for the attendance tracker:
//! - Record types (employees, practices, methods, touches)
//! - The [`Storage`] interface with JSON file and relational backends
//! - Configuration loading
//! - Shared-password sessions

pub mod auth;
pub mod config;
pub mod error;
pub mod json_store;
pub mod models;
pub mod sql_store;
pub mod storage;
pub mod validation;

pub use error::{Error, Result};
pub use storage::{open_storage, Storage};
