pub mod math;
pub mod time;
pub mod rate_limit;
pub mod logging;

pub use rate_limit::RequestPacer;
pub use logging::init_logging;
