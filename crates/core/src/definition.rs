//! Immutable declaration of how a transactional scope should behave.

use crate::error::{Error, Result};
use crate::isolation::Isolation;
use crate::propagation::Propagation;

/// Sentinel meaning "use the strategy's own default timeout".
pub const TIMEOUT_DEFAULT: i64 = -1;

/// An immutable declaration of propagation, isolation, timeout, read-only,
/// and name for a transactional scope.
///
/// `Definition` is cheap to clone and carries no resource handles of its
/// own — it is purely a request that the engine interprets against the
/// current execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Definition {
    propagation: Propagation,
    isolation: Isolation,
    timeout: i64,
    read_only: bool,
    name: Option<String>,
}

impl Definition {
    /// Build a definition with `Required` propagation, default isolation,
    /// default timeout, read-write, and no name — the common case.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the propagation behavior (builder-style, consumes `self`).
    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Set the isolation level (builder-style, consumes `self`).
    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Set the timeout in seconds, `-1` meaning "use the strategy's
    /// default" (builder-style, consumes `self`).
    pub fn with_timeout(mut self, timeout_seconds: i64) -> Self {
        self.timeout = timeout_seconds;
        self
    }

    /// Mark the transaction read-only (builder-style, consumes `self`).
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Attach a diagnostic name (builder-style, consumes `self`).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The requested propagation behavior.
    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// The requested isolation level.
    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// The requested timeout in seconds, or `-1` for "default".
    pub fn timeout(&self) -> i64 {
        self.timeout
    }

    /// Whether the transaction is read-only.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// The diagnostic name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Validate the invariant `timeout >= -1`.
    ///
    /// The engine calls this at the start of `get_transaction`; exposed
    /// publicly so callers can fail fast when building a `Definition` from
    /// untrusted input.
    pub fn validate(&self) -> Result<()> {
        if self.timeout < TIMEOUT_DEFAULT {
            return Err(Error::InvalidTimeout {
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}

impl Default for Definition {
    fn default() -> Self {
        Definition {
            propagation: Propagation::Required,
            isolation: Isolation::Default,
            timeout: TIMEOUT_DEFAULT,
            read_only: false,
            name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let def = Definition::new();
        assert_eq!(def.propagation(), Propagation::Required);
        assert_eq!(def.isolation(), Isolation::Default);
        assert_eq!(def.timeout(), -1);
        assert!(!def.read_only());
        assert_eq!(def.name(), None);
    }

    #[test]
    fn builder_chains_all_fields() {
        let def = Definition::new()
            .with_propagation(Propagation::RequiresNew)
            .with_isolation(Isolation::Serializable)
            .with_timeout(30)
            .with_read_only(true)
            .with_name("transfer-funds");

        assert_eq!(def.propagation(), Propagation::RequiresNew);
        assert_eq!(def.isolation(), Isolation::Serializable);
        assert_eq!(def.timeout(), 30);
        assert!(def.read_only());
        assert_eq!(def.name(), Some("transfer-funds"));
    }

    #[test]
    fn validate_rejects_timeouts_below_default_sentinel() {
        let def = Definition::new().with_timeout(-2);
        assert!(matches!(
            def.validate(),
            Err(Error::InvalidTimeout { timeout: -2 })
        ));
    }

    #[test]
    fn validate_accepts_default_sentinel_and_positive_timeouts() {
        assert!(Definition::new().with_timeout(-1).validate().is_ok());
        assert!(Definition::new().with_timeout(0).validate().is_ok());
        assert!(Definition::new().with_timeout(600).validate().is_ok());
    }
}
