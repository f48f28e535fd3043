//! The entry point for sending commands and queries.
//!
//! Every call follows the same shape: resolve the handler, assemble the
//! enabled behaviors around it, run the chain under the caller's cancellation
//! token, and hand back whatever the chain produced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use courier_core::{fail, CancellationToken, Command, Error, Handler, Message, Outcome, Query};
use tower::ServiceExt;

use crate::config::{BehaviorKind, ConfigError, PipelineOptions};
use crate::envelope::{codes, DispatchContext, Envelope, MESSAGE_TYPE_KEY};
use crate::pipeline::{
    AuthorizationLayer, BoxedChain, ChainBuilder, HandlerService, LoggingLayer, PerformanceLayer,
    ValidationLayer,
};
use crate::registry::HandlerRegistry;

/// Call ids are unique across every dispatcher in the process.
static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// Dispatches messages to their handlers through the configured behaviors.
///
/// Cheap to share behind an `Arc`; all state is immutable after construction.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    options: Arc<PipelineOptions>,
}

impl Dispatcher {
    /// # Errors
    ///
    /// Returns `ConfigError::DuplicateOrder` when `options` fails
    /// [`PipelineOptions::validate`].
    pub fn new(registry: Arc<HandlerRegistry>, options: PipelineOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            registry,
            options: Arc::new(options),
        })
    }

    /// Dispatcher with [`PipelineOptions::default`].
    #[must_use]
    pub fn with_defaults(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            options: Arc::new(PipelineOptions::default()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Execute a command. Void commands yield `Ok(())`.
    pub async fn send<C: Command>(&self, command: C, cancel: &CancellationToken) -> Outcome<C::Output> {
        self.dispatch(command, cancel).await
    }

    /// Execute a query.
    pub async fn query<Q: Query>(&self, query: Q, cancel: &CancellationToken) -> Outcome<Q::Output> {
        self.dispatch(query, cancel).await
    }

    async fn dispatch<M: Message>(&self, message: M, cancel: &CancellationToken) -> Outcome<M::Output> {
        let Some(handler) = self.registry.resolve::<M>() else {
            tracing::warn!(message_type = M::message_name(), "no handler registered");
            return fail(handler_not_found::<M>());
        };

        let call_id = NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed);
        let chain = self.chain::<M>(handler);
        let ctx = DispatchContext::for_message::<M>(call_id, cancel.clone());

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(message_type = M::message_name(), call_id, "dispatch cancelled");
                fail(cancelled::<M>())
            }
            result = chain.oneshot(Envelope::new(ctx, message)) => result,
        }
    }

    /// Fold the behaviors enabled for `M` around its handler.
    ///
    /// Validation and authorization are left out when nothing is registered
    /// for `M`; an empty check list would pass every message anyway.
    fn chain<M: Message>(&self, handler: Arc<dyn Handler<M>>) -> BoxedChain<M> {
        let mut builder = ChainBuilder::new();
        for (kind, order) in self.options.enabled_behaviors(M::SHAPE) {
            match kind {
                BehaviorKind::Validation => {
                    let validators = self.registry.validators::<M>();
                    if !validators.is_empty() {
                        builder.layer(order, ValidationLayer::new(validators));
                    }
                }
                BehaviorKind::Authorization => {
                    let authorizers = self.registry.authorizers::<M>();
                    if !authorizers.is_empty() {
                        builder.layer(order, AuthorizationLayer::new(authorizers));
                    }
                }
                BehaviorKind::Performance => {
                    builder.layer(order, PerformanceLayer::new(self.options.slow_threshold()));
                }
                BehaviorKind::Logging => {
                    builder.layer(order, LoggingLayer::new());
                }
            }
        }
        builder.build(HandlerService::new(handler))
    }
}

fn handler_not_found<M: Message>() -> Error {
    Error::unexpected(
        codes::HANDLER_NOT_FOUND,
        format!("no handler registered for `{}`", M::message_name()),
    )
    .with_metadata(MESSAGE_TYPE_KEY, M::message_name())
}

fn cancelled<M: Message>() -> Error {
    Error::failure(codes::CANCELLED, "the operation was cancelled")
        .with_metadata(MESSAGE_TYPE_KEY, M::message_name())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
