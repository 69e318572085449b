pub mod defillama_client;
pub mod registry_service;
pub mod collector_service;
pub mod risk_calculator;
pub mod scoring_service;
pub mod update_orchestrator;
pub mod query_service;

pub use defillama_client::*;
pub use registry_service::*;
pub use collector_service::*;
pub use risk_calculator::*;
pub use scoring_service::*;
pub use update_orchestrator::*;
pub use query_service::*;
