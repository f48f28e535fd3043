//! Handler registry: one handler per message type, plus the validators and
//! authorizers that guard it.
//!
//! Registration happens once at startup through [`RegistryBuilder`]; the
//! resulting [`HandlerRegistry`] is immutable and safe to read from any number
//! of concurrent dispatch calls without locking.

use std::any::{type_name, Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use courier_core::{Authorizer, Handler, Message, MessageShape, Validator};

type HandlerFactory<M> = Arc<dyn Fn() -> Arc<dyn Handler<M>> + Send + Sync>;
type ValidatorList<M> = Vec<Arc<dyn Validator<M>>>;
type AuthorizerList<M> = Vec<Arc<dyn Authorizer<M>>>;

// ---------------------------------------------------------------------------
// HandlerModule
// ---------------------------------------------------------------------------

/// A group of registrations applied together, e.g. everything a feature
/// module contributes. Modules are applied in the order they are passed to
/// [`RegistryBuilder::module`].
pub trait HandlerModule {
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    fn register(&self, registry: &mut RegistryBuilder);
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Description of one message-to-handler binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub message: &'static str,
    pub handler: &'static str,
    pub shape: MessageShape,
}

/// Errors from building a [`HandlerRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("message `{message}` is already handled by `{existing}`; refusing `{attempted}`")]
    ConflictingHandler {
        message: &'static str,
        existing: &'static str,
        attempted: &'static str,
    },
}

struct HandlerEntry {
    registration: Registration,
    handler_type: TypeId,
    /// Holds a `HandlerFactory<M>` for the keyed message type.
    factory: Box<dyn Any + Send + Sync>,
}

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

/// Collects registrations and checks them when [`build`](Self::build) runs.
///
/// Registering the same `(message, handler type)` pair again is ignored.
/// Registering a second, different handler type for a message is recorded as
/// a conflict and makes `build` fail. Every validator and authorizer instance
/// is kept, so two differently configured instances of one type both run.
/// Applying a module whose name was already applied is a no-op.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<TypeId, HandlerEntry>,
    order: Vec<TypeId>,
    validators: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    authorizers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    conflicts: Vec<RegistryError>,
    modules: Vec<&'static str>,
    applied_modules: HashSet<&'static str>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every registration made by `module`, unless a module with the
    /// same name was already applied.
    pub fn module<T: HandlerModule + ?Sized>(&mut self, module: &T) -> &mut Self {
        let name = module.name();
        if !self.applied_modules.insert(name) {
            tracing::debug!(module = name, "handler module already applied");
            return self;
        }
        tracing::debug!(module = name, "applying handler module");
        module.register(self);
        self.modules.push(name);
        self
    }

    /// Register one shared handler instance for `M`.
    pub fn handler<M, H>(&mut self, handler: H) -> &mut Self
    where
        M: Message,
        H: Handler<M> + 'static,
    {
        let shared: Arc<dyn Handler<M>> = Arc::new(handler);
        let factory: HandlerFactory<M> = Arc::new(move || Arc::clone(&shared));
        self.insert_handler::<M, H>(factory)
    }

    /// Register a factory producing a fresh handler for every dispatch of `M`.
    pub fn handler_factory<M, H, F>(&mut self, factory: F) -> &mut Self
    where
        M: Message,
        H: Handler<M> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let factory: HandlerFactory<M> = Arc::new(move || Arc::new(factory()) as Arc<dyn Handler<M>>);
        self.insert_handler::<M, H>(factory)
    }

    /// Add a validator for `M`. All validators for a message run, in
    /// registration order.
    pub fn validator<M, V>(&mut self, validator: V) -> &mut Self
    where
        M: Message,
        V: Validator<M> + 'static,
    {
        let slot = self
            .validators
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Box::new(ValidatorList::<M>::new()));
        if let Some(list) = slot.downcast_mut::<ValidatorList<M>>() {
            list.push(Arc::new(validator));
        }
        self
    }

    /// Add an authorizer for `M`. All authorizers for a message run, in
    /// registration order.
    pub fn authorizer<M, A>(&mut self, authorizer: A) -> &mut Self
    where
        M: Message,
        A: Authorizer<M> + 'static,
    {
        let slot = self
            .authorizers
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Box::new(AuthorizerList::<M>::new()));
        if let Some(list) = slot.downcast_mut::<AuthorizerList<M>>() {
            list.push(Arc::new(authorizer));
        }
        self
    }

    /// Freeze the registrations.
    ///
    /// # Errors
    ///
    /// Returns the first `RegistryError::ConflictingHandler` recorded, if two
    /// different handler types were registered for one message type.
    pub fn build(mut self) -> Result<HandlerRegistry, RegistryError> {
        if !self.conflicts.is_empty() {
            return Err(self.conflicts.swap_remove(0));
        }
        tracing::debug!(
            handlers = self.order.len(),
            modules = self.modules.len(),
            "handler registry built"
        );
        Ok(HandlerRegistry {
            handlers: self.handlers,
            order: self.order,
            validators: self.validators,
            authorizers: self.authorizers,
        })
    }

    fn insert_handler<M: Message, H: 'static>(&mut self, factory: HandlerFactory<M>) -> &mut Self {
        let key = TypeId::of::<M>();
        let handler_type = TypeId::of::<H>();

        if let Some(existing) = self.handlers.get(&key) {
            if existing.handler_type == handler_type {
                tracing::debug!(
                    message_type = M::message_name(),
                    handler = type_name::<H>(),
                    "duplicate handler registration ignored"
                );
            } else {
                self.conflicts.push(RegistryError::ConflictingHandler {
                    message: M::message_name(),
                    existing: existing.registration.handler,
                    attempted: type_name::<H>(),
                });
            }
            return self;
        }

        self.handlers.insert(
            key,
            HandlerEntry {
                registration: Registration {
                    message: M::message_name(),
                    handler: type_name::<H>(),
                    shape: M::SHAPE,
                },
                handler_type,
                factory: Box::new(factory),
            },
        );
        self.order.push(key);
        self
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Immutable lookup table from message type to handler, validators and
/// authorizers.
pub struct HandlerRegistry {
    handlers: HashMap<TypeId, HandlerEntry>,
    order: Vec<TypeId>,
    validators: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    authorizers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The handler for `M`, or `None` if nothing was registered.
    #[must_use]
    pub fn resolve<M: Message>(&self) -> Option<Arc<dyn Handler<M>>> {
        self.handlers
            .get(&TypeId::of::<M>())
            .and_then(|entry| entry.factory.downcast_ref::<HandlerFactory<M>>())
            .map(|factory| factory())
    }

    #[must_use]
    pub fn contains<M: Message>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<M>())
    }

    /// Validators registered for `M`, in registration order.
    #[must_use]
    pub fn validators<M: Message>(&self) -> Arc<[Arc<dyn Validator<M>>]> {
        self.validators
            .get(&TypeId::of::<M>())
            .and_then(|list| list.downcast_ref::<ValidatorList<M>>())
            .map_or_else(|| Arc::from(Vec::new()), |list| Arc::from(list.as_slice()))
    }

    /// Authorizers registered for `M`, in registration order.
    #[must_use]
    pub fn authorizers<M: Message>(&self) -> Arc<[Arc<dyn Authorizer<M>>]> {
        self.authorizers
            .get(&TypeId::of::<M>())
            .and_then(|list| list.downcast_ref::<AuthorizerList<M>>())
            .map_or_else(|| Arc::from(Vec::new()), |list| Arc::from(list.as_slice()))
    }

    /// Handler bindings in the order they were first registered.
    pub fn registrations(&self) -> impl Iterator<Item = &Registration> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.handlers.get(key))
            .map(|entry| &entry.registration)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use courier_core::{AuthorizationResult, CancellationToken, Error, Outcome};

    use super::*;

    struct CreateTag {
        name: String,
    }
    courier_core::impl_command!(CreateTag => u64);

    struct GetTag;
    courier_core::impl_query!(GetTag => String);

    struct CreateTagHandler;

    #[async_trait]
    impl Handler<CreateTag> for CreateTagHandler {
        async fn handle(&self, _message: CreateTag, _cancel: &CancellationToken) -> Outcome<u64> {
            Ok(1)
        }
    }

    struct OtherCreateTagHandler;

    #[async_trait]
    impl Handler<CreateTag> for OtherCreateTagHandler {
        async fn handle(&self, _message: CreateTag, _cancel: &CancellationToken) -> Outcome<u64> {
            Ok(2)
        }
    }

    struct GetTagHandler;

    #[async_trait]
    impl Handler<GetTag> for GetTagHandler {
        async fn handle(&self, _message: GetTag, _cancel: &CancellationToken) -> Outcome<String> {
            Ok("tag".to_string())
        }
    }

    /// Handler that counts how many instances were created.
    struct CountedHandler;

    static CREATED: AtomicU32 = AtomicU32::new(0);

    impl CountedHandler {
        fn new() -> Self {
            CREATED.fetch_add(1, Ordering::SeqCst);
            Self
        }
    }

    #[async_trait]
    impl Handler<GetTag> for CountedHandler {
        async fn handle(&self, _message: GetTag, _cancel: &CancellationToken) -> Outcome<String> {
            Ok("counted".to_string())
        }
    }

    struct NameRequired;

    #[async_trait]
    impl Validator<CreateTag> for NameRequired {
        async fn validate(&self, message: &CreateTag, _cancel: &CancellationToken) -> Vec<Error> {
            if message.name.is_empty() {
                vec![Error::validation("Tag.NameRequired", "Name is required")]
            } else {
                Vec::new()
            }
        }
    }

    struct NameShort;

    #[async_trait]
    impl Validator<CreateTag> for NameShort {
        async fn validate(&self, _message: &CreateTag, _cancel: &CancellationToken) -> Vec<Error> {
            Vec::new()
        }
    }

    struct DenyAll;

    #[async_trait]
    impl Authorizer<CreateTag> for DenyAll {
        async fn authorize(&self, _message: &CreateTag, _cancel: &CancellationToken) -> AuthorizationResult {
            AuthorizationResult::deny_all(Vec::new())
        }
    }

    struct TagModule;

    impl HandlerModule for TagModule {
        fn register(&self, registry: &mut RegistryBuilder) {
            registry
                .handler::<CreateTag, _>(CreateTagHandler)
                .handler::<GetTag, _>(GetTagHandler)
                .validator::<CreateTag, _>(NameRequired);
        }
    }

    #[tokio::test]
    async fn register_and_resolve() {
        let mut builder = HandlerRegistry::builder();
        builder.handler::<CreateTag, _>(CreateTagHandler);
        let registry = builder.build().unwrap();

        let handler = registry.resolve::<CreateTag>().unwrap();
        let cancel = CancellationToken::new();
        let out = handler
            .handle(CreateTag { name: "a".into() }, &cancel)
            .await
            .unwrap();
        assert_eq!(out, 1);
        assert!(registry.contains::<CreateTag>());
    }

    #[test]
    fn resolve_unregistered_returns_none() {
        let registry = HandlerRegistry::builder().build().unwrap();
        assert!(registry.resolve::<GetTag>().is_none());
        assert!(!registry.contains::<GetTag>());
        assert!(registry.is_empty());
    }

    #[test]
    fn same_pair_twice_is_suppressed() {
        let mut builder = HandlerRegistry::builder();
        builder
            .handler::<CreateTag, _>(CreateTagHandler)
            .handler::<CreateTag, _>(CreateTagHandler);
        let registry = builder.build().unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_handlers_for_one_message_are_rejected() {
        let mut builder = HandlerRegistry::builder();
        builder
            .handler::<CreateTag, _>(CreateTagHandler)
            .handler::<CreateTag, _>(OtherCreateTagHandler);

        let Err(err) = builder.build() else {
            panic!("conflicting handlers must not build");
        };
        let RegistryError::ConflictingHandler {
            existing, attempted, ..
        } = err;
        assert!(existing.ends_with("CreateTagHandler"));
        assert!(attempted.ends_with("OtherCreateTagHandler"));
    }

    #[test]
    fn registrations_keep_insertion_order() {
        let mut builder = HandlerRegistry::builder();
        builder
            .handler::<GetTag, _>(GetTagHandler)
            .handler::<CreateTag, _>(CreateTagHandler);
        let registry = builder.build().unwrap();

        let shapes: Vec<MessageShape> = registry.registrations().map(|r| r.shape).collect();
        assert_eq!(shapes, vec![MessageShape::Query, MessageShape::CommandWithResult]);
    }

    #[test]
    fn every_validator_instance_is_kept() {
        let mut builder = HandlerRegistry::builder();
        builder
            .validator::<CreateTag, _>(NameRequired)
            .validator::<CreateTag, _>(NameShort)
            .validator::<CreateTag, _>(NameRequired);
        let registry = builder.build().unwrap();

        assert_eq!(registry.validators::<CreateTag>().len(), 3);
        assert!(registry.validators::<GetTag>().is_empty());
    }

    #[test]
    fn authorizers_are_keyed_by_message() {
        let mut builder = HandlerRegistry::builder();
        builder
            .authorizer::<CreateTag, _>(DenyAll)
            .authorizer::<CreateTag, _>(DenyAll);
        let registry = builder.build().unwrap();

        assert_eq!(registry.authorizers::<CreateTag>().len(), 2);
        assert!(registry.authorizers::<GetTag>().is_empty());
    }

    #[test]
    fn module_applied_twice_registers_once() {
        let mut builder = HandlerRegistry::builder();
        builder.module(&TagModule).module(&TagModule);
        let registry = builder.build().unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.validators::<CreateTag>().len(), 1);
    }

    #[test]
    fn distinct_modules_are_both_applied() {
        struct ExtraChecks;

        impl HandlerModule for ExtraChecks {
            fn register(&self, registry: &mut RegistryBuilder) {
                registry.validator::<CreateTag, _>(NameRequired);
            }
        }

        let mut builder = HandlerRegistry::builder();
        builder.module(&TagModule).module(&ExtraChecks).module(&ExtraChecks);
        let registry = builder.build().unwrap();

        assert_eq!(registry.validators::<CreateTag>().len(), 2);
    }

    #[test]
    fn factory_builds_a_handler_per_resolution() {
        let mut builder = HandlerRegistry::builder();
        builder.handler_factory::<GetTag, _, _>(CountedHandler::new);
        let registry = builder.build().unwrap();

        let before = CREATED.load(Ordering::SeqCst);
        let _first = registry.resolve::<GetTag>().unwrap();
        let _second = registry.resolve::<GetTag>().unwrap();
        assert_eq!(CREATED.load(Ordering::SeqCst) - before, 2);
    }
}
