//! Authorization behavior.
//!
//! Same aggregation strategy as validation: every authorizer runs, and any
//! denial turns into one failure holding all denial errors.

use std::sync::Arc;
use std::task::{Context, Poll};

use courier_core::{Authorizer, Failure, Message};
use tower::{Layer, Service};

use super::chain::ChainFuture;
use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// AuthorizationLayer
// ---------------------------------------------------------------------------

/// Tower layer running the authorizers for `M` before the inner service.
pub struct AuthorizationLayer<M: Message> {
    authorizers: Arc<[Arc<dyn Authorizer<M>>]>,
}

impl<M: Message> AuthorizationLayer<M> {
    #[must_use]
    pub fn new(authorizers: Arc<[Arc<dyn Authorizer<M>>]>) -> Self {
        Self { authorizers }
    }
}

impl<M: Message> Clone for AuthorizationLayer<M> {
    fn clone(&self) -> Self {
        Self {
            authorizers: Arc::clone(&self.authorizers),
        }
    }
}

impl<S, M: Message> Layer<S> for AuthorizationLayer<M> {
    type Service = AuthorizationService<S, M>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationService {
            inner,
            authorizers: Arc::clone(&self.authorizers),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthorizationService
// ---------------------------------------------------------------------------

pub struct AuthorizationService<S, M: Message> {
    inner: S,
    authorizers: Arc<[Arc<dyn Authorizer<M>>]>,
}

impl<S: Clone, M: Message> Clone for AuthorizationService<S, M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            authorizers: Arc::clone(&self.authorizers),
        }
    }
}

impl<S, M> Service<Envelope<M>> for AuthorizationService<S, M>
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
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let authorizers = Arc::clone(&self.authorizers);

        Box::pin(async move {
            let mut denials = Vec::new();
            for authorizer in authorizers.iter() {
                let verdict = authorizer
                    .authorize(&envelope.message, &envelope.ctx.cancel)
                    .await;
                denials.extend(verdict.into_denials());
            }

            if let Some(failure) = Failure::from_errors(denials) {
                tracing::warn!(
                    message_type = envelope.ctx.message_name,
                    call_id = envelope.ctx.call_id,
                    error_count = failure.error_count(),
                    "authorization denied"
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

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use courier_core::{
        AuthorizationResult, CancellationToken, Error, ErrorKind, Handler, Outcome,
        AUTHORIZATION_DENIED,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::envelope::DispatchContext;
    use crate::pipeline::chain::HandlerService;

    struct Purge {
        role: &'static str,
    }
    courier_core::impl_command!(Purge => u32);

    struct PurgeHandler {
        called: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Handler<Purge> for PurgeHandler {
        async fn handle(&self, _message: Purge, _cancel: &CancellationToken) -> Outcome<u32> {
            self.called.store(true, Ordering::SeqCst);
            Ok(3)
        }
    }

    struct RequireRole(&'static str);

    #[async_trait]
    impl Authorizer<Purge> for RequireRole {
        async fn authorize(&self, message: &Purge, _cancel: &CancellationToken) -> AuthorizationResult {
            if message.role == self.0 {
                AuthorizationResult::allow()
            } else {
                AuthorizationResult::deny(Error::forbidden(
                    format!("Role.{}", self.0),
                    format!("role `{}` required", self.0),
                ))
            }
        }
    }

    struct SilentDeny;

    #[async_trait]
    impl Authorizer<Purge> for SilentDeny {
        async fn authorize(&self, _message: &Purge, _cancel: &CancellationToken) -> AuthorizationResult {
            AuthorizationResult::deny_all(Vec::new())
        }
    }

    fn service(
        authorizers: Vec<Arc<dyn Authorizer<Purge>>>,
    ) -> (AuthorizationService<HandlerService<Purge>, Purge>, Arc<AtomicBool>) {
        let called = Arc::new(AtomicBool::new(false));
        let handler = HandlerService::new(Arc::new(PurgeHandler {
            called: Arc::clone(&called),
        }));
        (AuthorizationLayer::new(Arc::from(authorizers)).layer(handler), called)
    }

    fn envelope(role: &'static str) -> Envelope<Purge> {
        Envelope::new(
            DispatchContext::for_message::<Purge>(1, CancellationToken::new()),
            Purge { role },
        )
    }

    #[tokio::test]
    async fn allowed_message_reaches_handler() {
        let (svc, called) = service(vec![Arc::new(RequireRole("admin"))]);
        assert_eq!(svc.oneshot(envelope("admin")).await.unwrap(), 3);
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn denial_stops_before_handler() {
        let (svc, called) = service(vec![Arc::new(RequireRole("admin"))]);
        let failure = svc.oneshot(envelope("guest")).await.unwrap_err();

        assert_eq!(failure.error_count(), 1);
        assert_eq!(failure.first().kind(), ErrorKind::Forbidden);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn denials_from_all_authorizers_are_aggregated() {
        let (svc, called) = service(vec![
            Arc::new(RequireRole("admin")),
            Arc::new(RequireRole("owner")),
            Arc::new(RequireRole("guest")),
        ]);
        let failure = svc.oneshot(envelope("guest")).await.unwrap_err();

        let codes: Vec<&str> = failure.errors().iter().map(Error::code).collect();
        assert_eq!(codes, vec!["Role.admin", "Role.owner"]);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn denial_without_reason_reports_default_error() {
        let (svc, _called) = service(vec![Arc::new(SilentDeny)]);
        let failure = svc.oneshot(envelope("admin")).await.unwrap_err();
        assert_eq!(failure.first().code(), AUTHORIZATION_DENIED);
    }
}
