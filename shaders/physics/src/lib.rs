//! PBF fluid physics shaders
//!
//! Every kernel is a plain function over slices, called once per invocation. The SPIR-V entry
//! points only unpack invocation IDs and bindings, so the same code runs on the CPU in tests.

#![cfg_attr(target_arch = "spirv", no_std)]
#![allow(clippy::missing_inline_in_public_items)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::as_conversions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_arguments)]

pub mod cell_ranges;
pub mod hash;
pub mod integrate;
pub mod kernel;
pub mod neighbours;
pub mod radix_sort;
pub mod solver;
pub mod viscosity;
pub mod vorticity;

#[cfg(target_arch = "spirv")]
mod entry_points;
