//! Shared types, errors, and configuration for Vigil.
//!
//! This crate provides common types used across all other crates:
//! - Money in minor integer units (never floats)
//! - Application-wide error types
//! - JWT claims and validation
//! - Configuration management

pub mod config;
pub mod error;
pub mod jwt;
pub mod types;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use jwt::{Claims, JwtError, JwtService};
pub use types::{Currency, Money};
