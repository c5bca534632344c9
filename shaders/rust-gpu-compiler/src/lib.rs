//! Builds a `no_std` shader crate into a single SPIR-V module.

use std::path::{Path, PathBuf};

use spirv_builder::{MetadataPrintout, SpirvBuilder, SpirvBuilderError};

/// Compile the crate at `path_to_crate`, returning where the module was written.
///
/// # Errors
/// If the crate doesn't compile for the SPIR-V target.
pub fn build(path_to_crate: &Path) -> Result<PathBuf, SpirvBuilderError> {
    println!("Compiling {} to SPIR-V...", path_to_crate.display());
    let compile_result = SpirvBuilder::new(path_to_crate, "spirv-unknown-vulkan1.1")
        .print_metadata(MetadataPrintout::None)
        .build()?;
    Ok(compile_result.module.unwrap_single().to_path_buf())
}
