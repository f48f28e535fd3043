//! Per-call context carried alongside the message through the behavior chain.

use courier_core::{CancellationToken, Message, MessageShape};
use uuid::Uuid;

/// Error codes produced by the dispatcher itself.
pub mod codes {
    pub const HANDLER_NOT_FOUND: &str = "Dispatch.HandlerNotFound";
    pub const CANCELLED: &str = "Dispatch.Cancelled";
}

/// Metadata key naming the message type on dispatcher-produced errors.
pub const MESSAGE_TYPE_KEY: &str = "messageType";

/// Context built once per dispatch call.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Process-unique, monotonically increasing call number.
    pub call_id: u64,
    /// Trace identifier recorded by the logging behavior.
    pub correlation_id: Uuid,
    pub message_name: &'static str,
    pub shape: MessageShape,
    /// Cancellation signal shared by every behavior and the handler.
    pub cancel: CancellationToken,
}

impl DispatchContext {
    /// Context for message type `M` with a fresh correlation id.
    #[must_use]
    pub fn for_message<M: Message>(call_id: u64, cancel: CancellationToken) -> Self {
        Self {
            call_id,
            correlation_id: Uuid::new_v4(),
            message_name: M::message_name(),
            shape: M::SHAPE,
            cancel,
        }
    }
}

/// A message travelling through the chain together with its context.
#[derive(Debug)]
pub struct Envelope<M> {
    pub ctx: DispatchContext,
    pub message: M,
}

impl<M: Message> Envelope<M> {
    #[must_use]
    pub fn new(ctx: DispatchContext, message: M) -> Self {
        Self { ctx, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Touch;
    courier_core::impl_command!(Touch);

    #[test]
    fn context_describes_message_type() {
        let ctx = DispatchContext::for_message::<Touch>(9, CancellationToken::new());
        assert_eq!(ctx.call_id, 9);
        assert_eq!(ctx.shape, MessageShape::Command);
        assert!(ctx.message_name.ends_with("Touch"));
        assert!(!ctx.cancel.is_cancelled());
    }

    #[test]
    fn correlation_ids_differ_per_call() {
        let a = DispatchContext::for_message::<Touch>(1, CancellationToken::new());
        let b = DispatchContext::for_message::<Touch>(2, CancellationToken::new());
        assert_ne!(a.correlation_id, b.correlation_id);
    }
}
