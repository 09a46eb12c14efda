//! Engine configuration.

use crate::engine::expression::HelperRegistry;
use std::time::Duration;

/// How composite rules evaluate their children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NestedExecutionMode {
    /// Evaluate every enabled child regardless of outcome, then combine.
    /// Every child result is attached to the parent.
    #[default]
    Exhaustive,
    /// Stop at the first failing child (AND) or first succeeding child
    /// (OR). Only the children actually evaluated are attached.
    ShortCircuit,
}

/// Bounds for the auxiliary memoization cache used by the single-rule
/// action path. The main compiled-artifact cache is unbounded and never
/// expires implicitly; this one evicts oldest-inserted-first beyond
/// `memo_size_limit` and drops entries older than `memo_ttl`.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub memo_size_limit: usize,
    pub memo_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memo_size_limit: 1000,
            memo_ttl: Duration::from_secs(600),
        }
    }
}

/// Engine-wide configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// When false, global and local scoped parameters are ignored entirely
    /// and expressions referencing them fail compilation with an
    /// identifier-not-found error.
    pub enable_scoped_params: bool,

    /// Exhaustive or short-circuit evaluation of composite rules.
    pub nested_execution_mode: NestedExecutionMode,

    /// When true (the default), expression compile errors are encoded into
    /// the result tree as failing results carrying the message. When false,
    /// they propagate as errors and abort the evaluation call.
    pub exceptions_as_error_messages: bool,

    /// When true (the default), failed results with an `ErrorMessage`
    /// template get `$(name)` placeholders substituted from runtime inputs.
    pub enable_formatted_error_message: bool,

    /// Case sensitivity of identifier matching: parameters, object members,
    /// methods, and helper functions.
    pub case_sensitive_identifiers: bool,

    pub cache: CacheSettings,

    /// Whitelisted helper functions callable from expressions.
    pub helpers: HelperRegistry,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enable_scoped_params: true,
            nested_execution_mode: NestedExecutionMode::default(),
            exceptions_as_error_messages: true,
            enable_formatted_error_message: true,
            case_sensitive_identifiers: true,
            cache: CacheSettings::default(),
            helpers: HelperRegistry::with_defaults(),
        }
    }
}
