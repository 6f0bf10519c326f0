//! Shared types, errors, and configuration for Coffer.
//!
//! This crate provides common types used across all other crates:
//! - Validated currency codes with their minor units
//! - Typed IDs for type-safe entity references
//! - Pagination types for list queries
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, DatabaseConfig, LedgerConfig};
pub use error::{AppError, AppResult};
