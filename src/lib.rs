//! Typed-value marshalling, parameterized queries and pooled execution for
//! PostgreSQL.
//!
//! - [`typed_value`]: [`TypedValue`] wraps a payload for a PostgreSQL domain
//!   type (network addresses, geometry, ranges, enums, ...) after checking its
//!   shape against the tag.
//! - [`query`]: [`ParameterizedQuery`] pairs a parsed SQL template with its
//!   parameters; the binder decides type hints and wire formats.
//! - [`client`]: [`Client`] runs `query`, `query_row`, `execute`,
//!   `batch_execute` and `call` over a pool shared by every client opened with
//!   the same configuration.
//!
//! Enable the `test-utils` feature for a scripted in-memory driver.

pub mod client;
pub mod driver;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod query;
pub mod results;
pub mod typed_value;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use client::{Client, ClientConfig, ProcedureCall, ProcedureResult, RowStream};
pub use error::PgMiddlewareError;
pub use query::{ParameterizedQuery, Template};
pub use results::{BatchMetadata, CustomDbRow, ExecutionMetadata, ResultSet};
pub use typed_value::{RawValue, TypeTag, TypedValue};
pub use types::RowValues;
