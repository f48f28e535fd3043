//! Validation behavior.
//!
//! Runs every validator registered for the message, collects all of their
//! errors, and only calls the rest of the chain when none were reported.

use std::sync::Arc;
use std::task::{Context, Poll};

use courier_core::{Failure, Message, Validator};
use tower::{Layer, Service};

use super::chain::ChainFuture;
use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// ValidationLayer
// ---------------------------------------------------------------------------

/// Tower layer running the validators for `M` before the inner service.
pub struct ValidationLayer<M: Message> {
    validators: Arc<[Arc<dyn Validator<M>>]>,
}

impl<M: Message> ValidationLayer<M> {
    #[must_use]
    pub fn new(validators: Arc<[Arc<dyn Validator<M>>]>) -> Self {
        Self { validators }
    }
}

impl<M: Message> Clone for ValidationLayer<M> {
    fn clone(&self) -> Self {
        Self {
            validators: Arc::clone(&self.validators),
        }
    }
}

impl<S, M: Message> Layer<S> for ValidationLayer<M> {
    type Service = ValidationService<S, M>;

    fn layer(&self, inner: S) -> Self::Service {
        ValidationService {
            inner,
            validators: Arc::clone(&self.validators),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationService
// ---------------------------------------------------------------------------

pub struct ValidationService<S, M: Message> {
    inner: S,
    validators: Arc<[Arc<dyn Validator<M>>]>,
}

impl<S: Clone, M: Message> Clone for ValidationService<S, M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            validators: Arc::clone(&self.validators),
        }
    }
}

impl<S, M> Service<Envelope<M>> for ValidationService<S, M>
where
    M: Message,
    S: Service<Envelope<M>, Response = M::Output, Error = Failure> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = M::Output;
    type Error = Failure;
    type Future = ChainFuture<M::Output>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, envelope: Envelope<M>) -> Self::Future {
        // The readied service goes into the future; its clone stays for the next call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let validators = Arc::clone(&self.validators);

        Box::pin(async move {
            let mut errors = Vec::new();
            for validator in validators.iter() {
                errors.extend(validator.validate(&envelope.message, &envelope.ctx.cancel).await);
            }

            if let Some(failure) = Failure::from_errors(errors) {
                tracing::debug!(
                    message_type = envelope.ctx.message_name,
                    call_id = envelope.ctx.call_id,
                    error_count = failure.error_count(),
                    "validation rejected message"
                );
                return Err(failure);
            }

            inner.call(envelope).await
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
