//! Bid price optimizer for real-time auctions.
//!
//! Learns per-context win probabilities online from auction feedback and
//! serves shaded bid prices. See [`optimizer`] for the moving parts.

mod errors;
pub mod optimizer;

pub use errors::{ConfigError, Error, Result, TrainingError};
pub use optimizer::config::ServiceConfig;
pub use optimizer::ledger::RoutingMetadata;
pub use optimizer::space::{CurveSnapshot, PricingSpace};
pub use optimizer::{OptimizeResponse, OptimizeStatus, PricingService};
