//! Engine-wide policy configuration.
//!
//! An [`EngineConfig`] is built once and handed to [`crate::workflow::WorkflowEngine::new`].
//! It is immutable for the engine's lifetime: fields are read, never
//! written, during `get_transaction`/`commit`/`rollback`.

/// When the engine activates a [`crate::registry`] synchronization scope
/// for propagation modes that don't themselves require an actual
/// transaction (`SUPPORTS`, `NOT_SUPPORTED`, `NEVER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SyncMode {
    /// Always activate synchronizations, even for transaction-less scopes.
    Always,
    /// Only activate synchronizations when an actual transaction is active.
    OnActual,
    /// Never activate synchronizations for transaction-less scopes.
    Never,
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::Always
    }
}

/// Policy knobs for a [`crate::workflow::WorkflowEngine`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// When to activate synchronizations for transaction-less scopes.
    pub sync_mode: SyncMode,
    /// Timeout (seconds) used when a `Definition` leaves timeout at `-1`.
    pub default_timeout: i64,
    /// Whether `NESTED` propagation is permitted at all.
    pub nested_allowed: bool,
    /// Whether participating in an existing transaction validates the
    /// requested isolation level and read-only flag against it.
    pub validate_existing_transaction: bool,
    /// Whether a participating transaction's rollback marks the outer
    /// transaction rollback-only (vs. doing nothing and letting the outer
    /// scope decide).
    pub global_rollback_on_participation_failure: bool,
    /// Whether the global-rollback-only flag is checked (and surfaced as
    /// `UnexpectedRollback`) even for participating transactions that don't
    /// themselves call `Strategy::commit`.
    pub fail_early_on_global_rollback_only: bool,
    /// Whether a failed `Strategy::commit` is recovered locally by
    /// attempting a rollback, rather than surfacing the commit failure with
    /// `afterCompletion(Unknown)`.
    pub rollback_on_commit_failure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sync_mode: SyncMode::Always,
            default_timeout: -1,
            nested_allowed: false,
            validate_existing_transaction: false,
            global_rollback_on_participation_failure: true,
            fail_early_on_global_rollback_only: false,
            rollback_on_commit_failure: false,
        }
    }
}

impl EngineConfig {
    /// Start from the documented defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the synchronization activation policy (builder-style).
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Set the default timeout in seconds (builder-style).
    pub fn with_default_timeout(mut self, seconds: i64) -> Self {
        self.default_timeout = seconds;
        self
    }

    /// Allow `NESTED` propagation (builder-style).
    pub fn with_nested_allowed(mut self, allowed: bool) -> Self {
        self.nested_allowed = allowed;
        self
    }

    /// Enable isolation/read-only validation against an existing
    /// transaction (builder-style).
    pub fn with_validate_existing_transaction(mut self, validate: bool) -> Self {
        self.validate_existing_transaction = validate;
        self
    }

    /// Set whether a participating rollback marks the outer transaction
    /// rollback-only (builder-style).
    pub fn with_global_rollback_on_participation_failure(mut self, enabled: bool) -> Self {
        self.global_rollback_on_participation_failure = enabled;
        self
    }

    /// Set whether the rollback-only flag is checked early for
    /// participating transactions (builder-style).
    pub fn with_fail_early_on_global_rollback_only(mut self, enabled: bool) -> Self {
        self.fail_early_on_global_rollback_only = enabled;
        self
    }

    /// Set whether commit failures are recovered locally via rollback
    /// (builder-style).
    pub fn with_rollback_on_commit_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_commit_failure = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = EngineConfig::default();
        assert_eq!(config.sync_mode, SyncMode::Always);
        assert_eq!(config.default_timeout, -1);
        assert!(!config.nested_allowed);
        assert!(!config.validate_existing_transaction);
        assert!(config.global_rollback_on_participation_failure);
        assert!(!config.fail_early_on_global_rollback_only);
        assert!(!config.rollback_on_commit_failure);
    }

    #[test]
    fn builder_overrides_each_field() {
        let config = EngineConfig::new()
            .with_sync_mode(SyncMode::Never)
            .with_default_timeout(60)
            .with_nested_allowed(true)
            .with_validate_existing_transaction(true)
            .with_global_rollback_on_participation_failure(false)
            .with_fail_early_on_global_rollback_only(true)
            .with_rollback_on_commit_failure(true);

        assert_eq!(config.sync_mode, SyncMode::Never);
        assert_eq!(config.default_timeout, 60);
        assert!(config.nested_allowed);
        assert!(config.validate_existing_transaction);
        assert!(!config.global_rollback_on_participation_failure);
        assert!(config.fail_early_on_global_rollback_only);
        assert!(config.rollback_on_commit_failure);
    }
}
