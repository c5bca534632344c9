//! Buffers, bind groups and compute pipelines for the PBF kernels

pub mod builder;
#[expect(clippy::module_inception, reason = "Matches the layout of the other runners")]
pub mod pipeline;

pub use pipeline::{Buffers, Pipeline};
