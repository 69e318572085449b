pub mod pool;
pub mod metric_point;
pub mod risk_score;
pub mod checkpoint;
pub mod upstream;
pub mod report;
pub mod query;

pub use pool::*;
pub use metric_point::*;
pub use risk_score::*;
pub use checkpoint::*;
pub use upstream::*;
pub use report::*;
pub use query::*;
