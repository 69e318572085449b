pub mod config;
pub mod models;
pub mod services;
pub mod handlers;
pub mod database;
pub mod utils;
pub mod error;

pub use error::types::*;
pub use handlers::AppState;
