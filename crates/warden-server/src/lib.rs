pub mod config;
pub mod error;
pub mod events;
pub mod middleware;
pub mod rest;
pub mod service;

pub use config::{AppConfig, ConfigError};
pub use error::ApiError;
