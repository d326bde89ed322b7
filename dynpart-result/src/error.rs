use std::fmt;
use thiserror::Error;

/// Unified error type for all dynpart operations.
///
/// Variants fall into three groups. Planner-contract violations (malformed
/// hierarchies, missing scan slots, impossible state transitions, unmapped
/// attributes) mean the plan handed to the executor is inconsistent and the
/// query must be aborted. Catalog and storage failures surface when a
/// relation or index the plan references cannot be resolved. Cancellation is
/// raised by cooperative interrupt checks.
///
/// Data conditions such as "no partition matched" are never errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument passed across a public API boundary.
    #[error("Invalid argument: {0}")]
    InvalidArgumentError(String),

    /// A relation id referenced by the plan does not exist in the catalog.
    #[error("relation {0} not found")]
    RelationNotFound(u32),

    /// No physical index on `relation` matches the logical index description.
    #[error("no index on relation {relation} matches logical index: {detail}")]
    IndexNotFound { relation: u32, detail: String },

    /// Catalog metadata error.
    #[error("{0}")]
    CatalogError(String),

    /// A partition hierarchy does not have the shape the plan assumes, for
    /// example a non-leaf rule without a child level.
    #[error("malformed partition hierarchy: {0}")]
    MalformedHierarchy(String),

    /// A partitioning level is keyed on something other than exactly one
    /// column.
    #[error("partitioning level {level} has {columns} key columns; exactly one is supported")]
    UnsupportedPartitionKey { level: usize, columns: usize },

    /// A scan slot was read before anything created it.
    #[error("scan slot {0} has not been registered")]
    MissingScanSlot(u32),

    /// A driver asked for the current relation of a slot whose cell is empty.
    #[error("scan slot {0} has no current relation")]
    NoCurrentRelation(u32),

    /// A dynamic scan was asked to move between two states that are not
    /// connected.
    #[error("Unknown state transition: {from} to {to}")]
    InvalidStateTransition {
        from: &'static str,
        to: &'static str,
    },

    /// An expression references an attribute that has no counterpart in the
    /// target layout.
    #[error("attribute {attno} has no counterpart in the target relation layout")]
    UnmappedAttribute { attno: i16 },

    /// Expression evaluation failed (type mismatch, unknown parameter...).
    #[error("expression evaluation failed: {0}")]
    ExprEval(String),

    /// The query was cancelled while executing.
    #[error("query cancelled")]
    Cancelled,

    /// Internal error indicating a bug or unexpected state.
    #[error("An internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Build an [`Error::ExprEval`] from any displayable message.
    #[inline]
    pub fn expr_eval<E: fmt::Display>(msg: E) -> Self {
        Error::ExprEval(msg.to_string())
    }

    #[inline]
    pub fn internal<E: fmt::Display>(msg: E) -> Self {
        Error::Internal(msg.to_string())
    }

    #[inline]
    pub fn state_transition(from: &'static str, to: &'static str) -> Self {
        Error::InvalidStateTransition { from, to }
    }

    /// True for errors caused by an inconsistent plan rather than by data,
    /// storage or cancellation.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::MalformedHierarchy(_)
                | Error::UnsupportedPartitionKey { .. }
                | Error::MissingScanSlot(_)
                | Error::NoCurrentRelation(_)
                | Error::InvalidStateTransition { .. }
                | Error::UnmappedAttribute { .. }
                | Error::Internal(_)
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Internal(format!("lock poisoned: {err}"))
    }
}
