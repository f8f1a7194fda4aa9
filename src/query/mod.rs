//! # Query
//!
//! The query a responder answers: hashing/partitioning parameters
//! ([`QueryInfo`]) and the shared, read-only [`QueryContext`] the
//! encryption primitive consumes.

mod context;
mod errors;
mod info;

pub use context::{QueryContext, SharedQueryContext};
pub use errors::{QueryError, QueryResult};
pub use info::QueryInfo;
