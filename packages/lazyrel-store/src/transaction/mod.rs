//! Transaction isolation, staging buffers, and atomic commit.

mod change;
mod staging_buffer;
#[allow(clippy::module_inception)]
mod transaction;

pub use change::Change;
pub use staging_buffer::StagingBuffer;
pub use transaction::Transaction;
