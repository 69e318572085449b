pub mod types;
pub mod retry;

pub use types::*;
pub use retry::*;
