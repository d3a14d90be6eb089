//! Isolation levels for transaction definitions.

/// Isolation level requested for a transaction.
///
/// The numeric encodings match the standard database driver constants
/// (`java.sql.Connection.TRANSACTION_*`), so a `Strategy` backed by such a
/// driver can pass `Isolation::code()` straight through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum Isolation {
    /// Use whatever isolation level the underlying resource defaults to.
    Default = -1,
    /// Dirty reads, non-repeatable reads, and phantom reads can all occur.
    ReadUncommitted = 1,
    /// Dirty reads are prevented; non-repeatable and phantom reads can occur.
    ReadCommitted = 2,
    /// Dirty and non-repeatable reads are prevented; phantoms can occur.
    RepeatableRead = 4,
    /// Dirty reads, non-repeatable reads, and phantom reads are all prevented.
    Serializable = 8,
}

impl Isolation {
    /// The stable integer encoding for this isolation level.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether this is the "use the resource's default" sentinel.
    pub fn is_default(self) -> bool {
        matches!(self, Isolation::Default)
    }
}

impl Default for Isolation {
    fn default() -> Self {
        Isolation::Default
    }
}
