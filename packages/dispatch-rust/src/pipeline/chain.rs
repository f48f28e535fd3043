//! Chain composition: folds ordered layers around a handler service.
//!
//! The builder knows nothing about concrete behaviors. Anything implementing
//! `tower::Layer` over a [`BoxedChain`] qualifies, which keeps ordering logic
//! testable with throwaway layers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use courier_core::{Failure, Handler, Message, Outcome};
use tower::util::BoxCloneService;
use tower::{Layer, Service};

use crate::envelope::Envelope;

/// Future returned by every service in a chain.
pub type ChainFuture<T> = Pin<Box<dyn Future<Output = Outcome<T>> + Send>>;

/// A type-erased, cloneable chain for message type `M`.
pub type BoxedChain<M> = BoxCloneService<Envelope<M>, <M as Message>::Output, Failure>;

type WrapFn<M> = Box<dyn FnOnce(BoxedChain<M>) -> BoxedChain<M> + Send>;

// ---------------------------------------------------------------------------
// HandlerService
// ---------------------------------------------------------------------------

/// Innermost service: hands the message to the resolved handler.
pub struct HandlerService<M: Message> {
    handler: Arc<dyn Handler<M>>,
}

impl<M: Message> HandlerService<M> {
    #[must_use]
    pub fn new(handler: Arc<dyn Handler<M>>) -> Self {
        Self { handler }
    }
}

impl<M: Message> Clone for HandlerService<M> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<M: Message> Service<Envelope<M>> for HandlerService<M> {
    type Response = M::Output;
    type Error = Failure;
    type Future = ChainFuture<M::Output>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, envelope: Envelope<M>) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        Box::pin(async move {
            let Envelope { ctx, message } = envelope;
            handler.handle(message, &ctx.cancel).await
        })
    }
}

// ---------------------------------------------------------------------------
// ChainBuilder
// ---------------------------------------------------------------------------

/// Collects `(order, layer)` pairs and builds the nested chain.
///
/// Lower order ends up outermost. Layers sharing an order keep the order in
/// which they were added.
pub struct ChainBuilder<M: Message> {
    layers: Vec<(i32, WrapFn<M>)>,
}

impl<M: Message> ChainBuilder<M> {
    #[must_use]
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add `layer` at position `order`.
    pub fn layer<L>(&mut self, order: i32, layer: L) -> &mut Self
    where
        L: Layer<BoxedChain<M>> + Send + 'static,
        L::Service: Service<Envelope<M>, Response = M::Output, Error = Failure> + Clone + Send + 'static,
        <L::Service as Service<Envelope<M>>>::Future: Send + 'static,
    {
        self.layers
            .push((order, Box::new(move |inner| BoxCloneService::new(layer.layer(inner)))));
        self
    }

    /// Wrap `inner` with every layer, innermost first, so the outermost
    /// service runs the lowest order.
    pub fn build<S>(self, inner: S) -> BoxedChain<M>
    where
        S: Service<Envelope<M>, Response = M::Output, Error = Failure> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        let mut layers = self.layers;
        layers.sort_by_key(|(order, _)| *order);
        layers
            .into_iter()
            .rev()
            .fold(BoxCloneService::new(inner), |chain, (_, wrap)| wrap(chain))
    }
}

impl<M: Message> Default for ChainBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
