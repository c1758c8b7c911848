mod from_row;
mod metadata;
mod result_set;
mod row;

pub use from_row::{FromDbRow, FromRowValue};
pub use metadata::{BatchMetadata, ExecutionMetadata};
pub use result_set::ResultSet;
pub use row::CustomDbRow;
pub(crate) use row::index_columns;
