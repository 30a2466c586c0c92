//! Generic containers shared by the VFS, process tables, device registries
//! and timers. Every container carries its own lock; iteration holds that
//! lock for the lifetime of the iterator guard.

pub mod chunk_buffer;
pub mod dict;
pub mod fifo;
pub mod list;

pub use chunk_buffer::ChunkBuffer;
pub use dict::Dict;
pub use fifo::Fifo;
pub use list::List;
