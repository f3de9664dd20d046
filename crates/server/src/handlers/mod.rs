//! API handlers module

pub mod auth;
pub mod billing;
pub mod categories;
pub mod health;
pub mod products;
pub mod public;
pub mod restaurant;
