//! Courier dispatch: in-process command/query dispatcher with a configurable
//! behavior pipeline.
//!
//! 1. **Registry** (`registry`): message type -> handler, validators, authorizers
//! 2. **Pipeline** (`pipeline`): Tower layers for validation, authorization,
//!    logging and performance, folded around the handler by `ChainBuilder`
//! 3. **Dispatcher** (`dispatcher`): `send` / `query` entry points
//! 4. **Config** (`config`): which behaviors run and in what order

pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod pipeline;
pub mod registry;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use config::{BehaviorKind, BehaviorOptions, ConfigError, PipelineOptions};
pub use dispatcher::Dispatcher;
pub use envelope::{codes, DispatchContext, Envelope, MESSAGE_TYPE_KEY};
pub use registry::{HandlerModule, HandlerRegistry, Registration, RegistryBuilder, RegistryError};
pub use telemetry::{init_tracing, LogFormat, TelemetryError};
