//! Tower layers forming the behavior chain around a handler.
//!
//! - [`chain`]: Orders layers and folds them around the handler service
//! - [`validation`]: Aggregates validator errors before the handler runs
//! - [`authorization`]: Aggregates authorizer denials before the handler runs
//! - [`logging`]: Dispatch span with start and outcome events
//! - [`performance`]: Warns about dispatches slower than a threshold

pub mod authorization;
pub mod chain;
pub mod logging;
pub mod performance;
pub mod validation;

pub use authorization::AuthorizationLayer;
pub use chain::{BoxedChain, ChainBuilder, ChainFuture, HandlerService};
pub use logging::LoggingLayer;
pub use performance::PerformanceLayer;
pub use validation::ValidationLayer;
