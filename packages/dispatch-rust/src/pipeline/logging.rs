//! Logging behavior.
//!
//! Opens a `dispatch` span carrying the message name and correlation id,
//! logs the start, then the outcome with its duration. The outcome itself is
//! passed through untouched.

use std::marker::PhantomData;
use std::task::{Context, Poll};
use std::time::Instant;

use courier_core::{Failure, Message};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use super::chain::ChainFuture;
use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// LoggingLayer
// ---------------------------------------------------------------------------

/// Tower layer recording each dispatch in a `tracing` span.
#[derive(Debug)]
pub struct LoggingLayer<M> {
    _message: PhantomData<fn() -> M>,
}

impl<M> LoggingLayer<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _message: PhantomData,
        }
    }
}

impl<M> Default for LoggingLayer<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for LoggingLayer<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<S, M> Layer<S> for LoggingLayer<M> {
    type Service = LoggingService<S, M>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService {
            inner,
            _message: PhantomData,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingService
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct LoggingService<S, M> {
    inner: S,
    _message: PhantomData<fn() -> M>,
}

impl<S: Clone, M> Clone for LoggingService<S, M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _message: PhantomData,
        }
    }
}

impl<S, M> Service<Envelope<M>> for LoggingService<S, M>
where
    M: Message,
    S: Service<Envelope<M>, Response = M::Output, Error = Failure> + Send,
    S::Future: Send + 'static,
{
    type Response = M::Output;
    type Error = Failure;
    type Future = ChainFuture<M::Output>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, envelope: Envelope<M>) -> Self::Future {
        let ctx = &envelope.ctx;
        let span = info_span!(
            "dispatch",
            message_type = ctx.message_name,
            shape = %ctx.shape,
            call_id = ctx.call_id,
            correlation_id = %ctx.correlation_id,
        );

        // Futures are lazy: nothing inside the chain runs before the first poll.
        let fut = self.inner.call(envelope);

        Box::pin(
            async move {
                tracing::info!("handling message");
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;

                match &result {
                    Ok(_) => tracing::info!(duration_ms, "message handled"),
                    Err(failure) => tracing::warn!(
                        duration_ms,
                        error_count = failure.error_count(),
                        first_error = failure.first().code(),
                        kind = %failure.first().kind(),
                        "message failed"
                    ),
                }

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use courier_core::{fail, CancellationToken, Error, Handler, Outcome};
    use tower::ServiceExt;

    use super::*;
    use crate::envelope::DispatchContext;
    use crate::pipeline::chain::HandlerService;
    use crate::test_support::capture_logs;

    struct Lookup {
        id: u32,
    }
    courier_core::impl_query!(Lookup => String);

    struct LookupHandler;

    #[async_trait]
    impl Handler<Lookup> for LookupHandler {
        async fn handle(&self, message: Lookup, _cancel: &CancellationToken) -> Outcome<String> {
            if message.id == 0 {
                fail(Error::not_found("Lookup.NotFound", "no such id"))
            } else {
                Ok(format!("item-{}", message.id))
            }
        }
    }

    fn service() -> LoggingService<HandlerService<Lookup>, Lookup> {
        LoggingLayer::new().layer(HandlerService::new(Arc::new(LookupHandler)))
    }

    fn envelope(id: u32) -> Envelope<Lookup> {
        Envelope::new(
            DispatchContext::for_message::<Lookup>(7, CancellationToken::new()),
            Lookup { id },
        )
    }

    #[tokio::test]
    async fn success_is_passed_through_and_logged() {
        let (logs, _guard) = capture_logs();
        let env = envelope(4);
        let correlation = env.ctx.correlation_id.to_string();

        let out = service().oneshot(env).await.unwrap();
        assert_eq!(out, "item-4");

        let text = logs.contents();
        assert!(text.contains("handling message"));
        assert!(text.contains("message handled"));
        assert!(text.contains(&correlation));
        assert!(text.contains("Lookup"));
    }

    #[tokio::test]
    async fn failure_is_passed_through_and_warned() {
        let (logs, _guard) = capture_logs();

        let failure = service().oneshot(envelope(0)).await.unwrap_err();
        assert_eq!(failure.first().code(), "Lookup.NotFound");

        let text = logs.contents();
        assert!(text.contains("WARN"));
        assert!(text.contains("message failed"));
        assert!(text.contains("error_count=1"));
    }
}
