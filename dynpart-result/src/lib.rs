//! Error types and result definitions for dynpart.
//!
//! Every crate in the workspace returns [`Result<T>`] and propagates with `?`.
//! A single [`Error`] enum keeps crate boundaries free of conversion
//! boilerplate.
//!
//! # Error Categories
//!
//! - **Plan contract violations**: [`Error::MalformedHierarchy`],
//!   [`Error::UnsupportedPartitionKey`], [`Error::MissingScanSlot`],
//!   [`Error::NoCurrentRelation`], [`Error::InvalidStateTransition`],
//!   [`Error::UnmappedAttribute`], [`Error::Internal`]
//! - **Catalog and storage**: [`Error::RelationNotFound`],
//!   [`Error::IndexNotFound`], [`Error::CatalogError`]
//! - **Evaluation**: [`Error::ExprEval`]
//! - **Cancellation**: [`Error::Cancelled`]

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
