//! Message contracts: commands and queries.
//!
//! A message type is bound to its output type and shape at compile time; the
//! dispatcher uses `TypeId::of::<M>()` as the registry key, so one concrete
//! message type always maps to one handler.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of message capability shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageShape {
    /// A state change that produces no value.
    Command,
    /// A state change that produces a value.
    CommandWithResult,
    /// A read that always produces a value.
    Query,
}

impl MessageShape {
    #[must_use]
    pub const fn is_command(self) -> bool {
        matches!(self, Self::Command | Self::CommandWithResult)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::CommandWithResult => "command_with_result",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for MessageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which message shapes a pipeline behavior applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorScope {
    #[default]
    All,
    Commands,
    Queries,
}

impl BehaviorScope {
    #[must_use]
    pub const fn applies_to(self, shape: MessageShape) -> bool {
        match self {
            Self::All => true,
            Self::Commands => shape.is_command(),
            Self::Queries => !shape.is_command(),
        }
    }
}

/// An immutable value describing one unit of work.
///
/// Implement through [`impl_command!`](crate::impl_command) or
/// [`impl_query!`](crate::impl_query) rather than by hand so that `SHAPE`
/// always agrees with the marker trait.
pub trait Message: Send + Sync + 'static {
    /// Value produced on success; `()` for void commands.
    type Output: Send + 'static;

    const SHAPE: MessageShape;

    /// Identifier used in logs and resolution errors.
    #[must_use]
    fn message_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Marker for messages that change state.
pub trait Command: Message {}

/// Marker for messages that only read state.
pub trait Query: Message {}

/// Declare a command type.
///
/// ```ignore
/// impl_command!(DeleteCategory);                 // Output = ()
/// impl_command!(CreateCategory => CategoryId);   // Output = CategoryId
/// ```
#[macro_export]
macro_rules! impl_command {
    ($ty:ty) => {
        impl $crate::Message for $ty {
            type Output = ();
            const SHAPE: $crate::MessageShape = $crate::MessageShape::Command;
        }

        impl $crate::Command for $ty {}
    };
    ($ty:ty => $out:ty) => {
        impl $crate::Message for $ty {
            type Output = $out;
            const SHAPE: $crate::MessageShape = $crate::MessageShape::CommandWithResult;
        }

        impl $crate::Command for $ty {}
    };
}

/// Declare a query type.
///
/// ```ignore
/// impl_query!(GetCategoryById => CategoryDto);
/// ```
#[macro_export]
macro_rules! impl_query {
    ($ty:ty => $out:ty) => {
        impl $crate::Message for $ty {
            type Output = $out;
            const SHAPE: $crate::MessageShape = $crate::MessageShape::Query;
        }

        impl $crate::Query for $ty {}
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
