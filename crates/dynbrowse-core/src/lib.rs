//! Query expression engine for dynbrowse.
//!
//! Compiles a user expression against a table schema into either an indexed
//! key condition with a residual filter or a scan filter, and evaluates the
//! same expression against in-memory rows.

pub mod config;
pub mod error;
pub mod item;
pub mod query;
pub mod result_set;

pub use config::BrowseConfig;
pub use error::{QueryError, QueryResult};
pub use query::{Plan, compile, compile_with_context, evaluate};
pub use result_set::{MarkOp, ResultSet, RowFlags};
