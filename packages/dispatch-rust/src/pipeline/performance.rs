//! Performance behavior.
//!
//! Times the rest of the chain and emits a warning when a dispatch takes at
//! least the configured threshold. Never changes the outcome.

use std::marker::PhantomData;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use courier_core::{Failure, Message};
use tower::{Layer, Service};

use super::chain::ChainFuture;
use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// PerformanceLayer
// ---------------------------------------------------------------------------

/// Tower layer flagging slow dispatches.
#[derive(Debug)]
pub struct PerformanceLayer<M> {
    threshold: Duration,
    _message: PhantomData<fn() -> M>,
}

impl<M> PerformanceLayer<M> {
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            _message: PhantomData,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

impl<M> Clone for PerformanceLayer<M> {
    fn clone(&self) -> Self {
        Self::new(self.threshold)
    }
}

impl<S, M> Layer<S> for PerformanceLayer<M> {
    type Service = PerformanceService<S, M>;

    fn layer(&self, inner: S) -> Self::Service {
        PerformanceService {
            inner,
            threshold: self.threshold,
            _message: PhantomData,
        }
    }
}

// ---------------------------------------------------------------------------
// PerformanceService
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PerformanceService<S, M> {
    inner: S,
    threshold: Duration,
    _message: PhantomData<fn() -> M>,
}

impl<S: Clone, M> Clone for PerformanceService<S, M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            threshold: self.threshold,
            _message: PhantomData,
        }
    }
}

impl<S, M> Service<Envelope<M>> for PerformanceService<S, M>
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
        let message_type = envelope.ctx.message_name;
        let call_id = envelope.ctx.call_id;
        let threshold = self.threshold;
        let fut = self.inner.call(envelope);

        Box::pin(async move {
            let start = Instant::now();
            let result = fut.await;
            let elapsed = start.elapsed();

            if elapsed >= threshold {
                #[allow(clippy::cast_possible_truncation)]
                let (elapsed_ms, threshold_ms) =
                    (elapsed.as_millis() as u64, threshold.as_millis() as u64);
                tracing::warn!(
                    message_type,
                    call_id,
                    elapsed_ms,
                    threshold_ms,
                    "message exceeded performance threshold"
                );
            }

            result
        })
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

    struct Report {
        delay_ms: u64,
        broken: bool,
    }
    courier_core::impl_query!(Report => u64);

    struct ReportHandler;

    #[async_trait]
    impl Handler<Report> for ReportHandler {
        async fn handle(&self, message: Report, _cancel: &CancellationToken) -> Outcome<u64> {
            tokio::time::sleep(Duration::from_millis(message.delay_ms)).await;
            if message.broken {
                return fail(Error::failure("Report.Broken", "report generation failed"));
            }
            Ok(message.delay_ms)
        }
    }

    fn service(threshold: Duration) -> PerformanceService<HandlerService<Report>, Report> {
        PerformanceLayer::new(threshold).layer(HandlerService::new(Arc::new(ReportHandler)))
    }

    fn envelope(delay_ms: u64, broken: bool) -> Envelope<Report> {
        Envelope::new(
            DispatchContext::for_message::<Report>(3, CancellationToken::new()),
            Report { delay_ms, broken },
        )
    }

    #[tokio::test]
    async fn slow_dispatch_is_warned_and_result_unchanged() {
        let (logs, _guard) = capture_logs();

        let out = service(Duration::from_millis(1))
            .oneshot(envelope(5, false))
            .await
            .unwrap();
        assert_eq!(out, 5);

        let text = logs.contents();
        assert!(text.contains("message exceeded performance threshold"));
        assert!(text.contains("threshold_ms=1"));
        assert!(text.contains("Report"));
    }

    #[tokio::test]
    async fn fast_dispatch_is_silent() {
        let (logs, _guard) = capture_logs();

        let out = service(Duration::from_secs(60))
            .oneshot(envelope(0, false))
            .await
            .unwrap();
        assert_eq!(out, 0);
        assert!(!logs.contents().contains("exceeded"));
    }

    #[tokio::test]
    async fn slow_failure_is_still_returned_as_is() {
        let (logs, _guard) = capture_logs();

        let failure = service(Duration::from_millis(1))
            .oneshot(envelope(5, true))
            .await
            .unwrap_err();
        assert_eq!(failure.first().code(), "Report.Broken");
        assert!(logs.contents().contains("exceeded"));
    }
}
