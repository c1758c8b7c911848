//! Test support: a scripted in-memory driver and small builders.

mod mock;
mod test_helpers;

pub use mock::{MockCell, MockConnection, MockDatabase, MockManager, MockReply, MockRow, MockRows};
pub use test_helpers::{create_test_row, query};
