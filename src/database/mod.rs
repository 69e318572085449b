pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::*;
pub use migrations::*;
pub use repositories::*;
pub use store::SqliteStore;
