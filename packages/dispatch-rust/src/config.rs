//! Pipeline configuration: which behaviors run, and in which order.
//!
//! Built once at startup (defaults, optionally overridden from JSON) and then
//! shared read-only by the dispatcher.

use std::fmt;
use std::time::Duration;

use courier_core::{BehaviorScope, MessageShape};
use serde::{Deserialize, Serialize};

/// Default elapsed time at which the performance behavior starts warning.
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 500;

/// The built-in cross-cutting behaviors.
///
/// Variant order doubles as the tie-breaker when two behaviors share an
/// order value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    Validation,
    Authorization,
    Performance,
    Logging,
}

impl BehaviorKind {
    pub const ALL: [BehaviorKind; 4] = [
        Self::Validation,
        Self::Authorization,
        Self::Performance,
        Self::Logging,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::Performance => "performance",
            Self::Logging => "logging",
        }
    }
}

impl fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Switch and position of one behavior. Lower `order` runs earlier (outermost).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorOptions {
    pub enabled: bool,
    pub order: i32,
    #[serde(default)]
    pub scope: BehaviorScope,
}

impl BehaviorOptions {
    #[must_use]
    pub const fn enabled(order: i32) -> Self {
        Self {
            enabled: true,
            order,
            scope: BehaviorScope::All,
        }
    }

    #[must_use]
    pub const fn disabled(order: i32) -> Self {
        Self {
            enabled: false,
            order,
            scope: BehaviorScope::All,
        }
    }

    #[must_use]
    pub const fn with_scope(mut self, scope: BehaviorScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Configuration for the behavior pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub validation: BehaviorOptions,
    pub authorization: BehaviorOptions,
    pub performance: BehaviorOptions,
    pub logging: BehaviorOptions,
    /// Elapsed time at or above which the performance behavior warns.
    pub slow_threshold_ms: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            validation: BehaviorOptions::enabled(1),
            authorization: BehaviorOptions::disabled(2),
            performance: BehaviorOptions::disabled(3),
            logging: BehaviorOptions::enabled(4),
            slow_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
        }
    }
}

/// Errors from building or checking a [`PipelineOptions`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid pipeline options: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("behaviors `{first}` and `{second}` are both enabled with order {order}")]
    DuplicateOrder {
        first: BehaviorKind,
        second: BehaviorKind,
        order: i32,
    },
}

impl PipelineOptions {
    /// Defaults overridden by a (possibly partial) JSON document, e.g.
    /// `{"authorization": {"enabled": true}, "slow_threshold_ms": 200}`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON or unknown fields, and
    /// `ConfigError::DuplicateOrder` if the result fails [`Self::validate`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let overrides: PipelineOverrides = serde_json::from_str(json)?;
        let options = overrides.apply(Self::default());
        options.validate()?;
        Ok(options)
    }

    /// Rejects two enabled behaviors sharing one order value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DuplicateOrder` naming the first clash found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let enabled: Vec<(BehaviorKind, i32)> = BehaviorKind::ALL
            .into_iter()
            .map(|kind| (kind, self.behavior(kind)))
            .filter(|(_, opts)| opts.enabled)
            .map(|(kind, opts)| (kind, opts.order))
            .collect();

        for (i, (first, order)) in enabled.iter().enumerate() {
            if let Some((second, _)) = enabled[i + 1..].iter().find(|(_, o)| o == order) {
                return Err(ConfigError::DuplicateOrder {
                    first: *first,
                    second: *second,
                    order: *order,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn behavior(&self, kind: BehaviorKind) -> BehaviorOptions {
        match kind {
            BehaviorKind::Validation => self.validation,
            BehaviorKind::Authorization => self.authorization,
            BehaviorKind::Performance => self.performance,
            BehaviorKind::Logging => self.logging,
        }
    }

    pub fn behavior_mut(&mut self, kind: BehaviorKind) -> &mut BehaviorOptions {
        match kind {
            BehaviorKind::Validation => &mut self.validation,
            BehaviorKind::Authorization => &mut self.authorization,
            BehaviorKind::Performance => &mut self.performance,
            BehaviorKind::Logging => &mut self.logging,
        }
    }

    #[must_use]
    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }

    /// Enabled behaviors applicable to `shape`, ascending by order. Equal
    /// orders fall back to [`BehaviorKind`] order.
    #[must_use]
    pub fn enabled_behaviors(&self, shape: MessageShape) -> Vec<(BehaviorKind, i32)> {
        let mut behaviors: Vec<(BehaviorKind, i32)> = BehaviorKind::ALL
            .into_iter()
            .map(|kind| (kind, self.behavior(kind)))
            .filter(|(_, opts)| opts.enabled && opts.scope.applies_to(shape))
            .map(|(kind, opts)| (kind, opts.order))
            .collect();
        behaviors.sort_by_key(|&(kind, order)| (order, kind));
        behaviors
    }
}

// ---------------------------------------------------------------------------
// Partial overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PipelineOverrides {
    validation: Option<BehaviorOverride>,
    authorization: Option<BehaviorOverride>,
    performance: Option<BehaviorOverride>,
    logging: Option<BehaviorOverride>,
    slow_threshold_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BehaviorOverride {
    enabled: Option<bool>,
    order: Option<i32>,
    scope: Option<BehaviorScope>,
}

impl BehaviorOverride {
    fn apply(self, base: &mut BehaviorOptions) {
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(order) = self.order {
            base.order = order;
        }
        if let Some(scope) = self.scope {
            base.scope = scope;
        }
    }
}

impl PipelineOverrides {
    fn apply(self, mut options: PipelineOptions) -> PipelineOptions {
        let behaviors = [
            (BehaviorKind::Validation, self.validation),
            (BehaviorKind::Authorization, self.authorization),
            (BehaviorKind::Performance, self.performance),
            (BehaviorKind::Logging, self.logging),
        ];
        for (kind, patch) in behaviors {
            if let Some(patch) = patch {
                patch.apply(options.behavior_mut(kind));
            }
        }
        if let Some(ms) = self.slow_threshold_ms {
            options.slow_threshold_ms = ms;
        }
        options
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
