//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types so that one `use`
//! covers building values, queries and running them.

pub use crate::client::{
    Client, ClientConfig, OutParam, ProcedureCall, ProcedureKind, ProcedureResult, RowStream,
};
pub use crate::error::PgMiddlewareError;
pub use crate::pool::{PoolRegistry, PoolSettings, PoolStatus};
pub use crate::query::{BindOptions, ParameterizedQuery, PlaceholderStyle, Template};
pub use crate::results::{
    BatchMetadata, CustomDbRow, ExecutionMetadata, FromDbRow, FromRowValue, ResultSet,
};
pub use crate::typed_value::{RawValue, TypeTag, TypedValue};
pub use crate::types::RowValues;

#[cfg(feature = "postgres")]
pub use crate::postgres::{PgClient, PostgresConfig, PostgresOptions, SslConfig, SslMode};
