//! Core TimeGen client library (config, session, gateway, services, rendering).

pub mod api;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod render;
pub mod session;
pub mod validation;

pub use timegen_types as types;
