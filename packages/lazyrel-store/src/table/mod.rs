//! Table schema, column definitions, and relation management.

mod column;
mod query;
mod relation;
#[allow(clippy::module_inception)]
mod table;
pub(crate) mod validation;

pub use column::Column;
pub(crate) use query::{compile_filter, CompiledFilter, RowSource, RowsRef};
pub use relation::Relation;
pub use table::{Table, ID_COLUMN};
