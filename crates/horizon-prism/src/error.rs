//! Error types for collection views.

use thiserror::Error;

/// Errors reported by collection-view operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrismError {
    /// An invalid call sequence: committing the wrong transaction kind,
    /// mutating during an incompatible transaction, editing through a
    /// read-only surface, and similar caller bugs. The view state remains
    /// valid.
    #[error("invalid operation: {0}")]
    Usage(&'static str),

    /// A capability (sorting, filtering, live shaping, editing) was requested
    /// but the source does not support it.
    #[error("capability not supported by source: {0}")]
    CapabilityUnsupported(&'static str),

    /// The source reported a multi-item structural change. Range actions are
    /// not supported; there is no best-effort partial handling.
    #[error("range structural actions are not supported")]
    RangeActionUnsupported,

    /// The shadow copy and the source disagree after an operation that should
    /// have left them balanced. Recoverable only by a full refresh.
    #[error("shadow copy inconsistent with source")]
    ConsistencyViolation,

    /// A read was attempted while a refresh-deferral scope is open.
    #[error("view reads are unavailable while refresh is deferred")]
    RefreshDeferred,

    /// A currency move targeted a position outside `[-1, count]`.
    #[error("position {position} out of range for view of {count} items")]
    PositionOutOfRange {
        /// The requested position.
        position: isize,
        /// The view's item count at the time of the call.
        count: usize,
    },

    /// A remove or edit targeted the new-item placeholder.
    #[error("operation targets the new-item placeholder")]
    PlaceholderMisuse,
}

/// A specialized Result type for collection-view operations.
pub type PrismResult<T> = Result<T, PrismError>;
