//! Carta Core Library
//!
//! Shared code for the Carta menu platform including:
//! - Database models and repository patterns
//! - Tenant authorization and plan quotas
//! - Billing provider abstraction
//! - Public menu projection and QR rendering
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod authz;
pub mod billing;
pub mod config;
pub mod db;
pub mod errors;
pub mod menu;
pub mod metrics;
pub mod qr;
pub mod slug;

// Re-export commonly used types
pub use billing::{BillingBridge, BillingProvider};
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default public layout for new restaurants
pub const DEFAULT_LAYOUT: &str = "list";
