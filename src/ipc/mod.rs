//! Inter-process communication primitives.

pub mod pipe;

pub use pipe::{create_pipe, PipeEndpoint};
