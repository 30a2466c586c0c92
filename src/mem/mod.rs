//! Memory management: the kernel heap arena and the fixed-size object pool.

pub mod heap;
pub mod pool;

pub use heap::{BlockHandle, KernelHeap};
pub use pool::{Pool, PoolBox};
