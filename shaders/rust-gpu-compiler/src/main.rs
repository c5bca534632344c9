//! Compiles `shaders/physics` and copies the module to where the simulation looks for it.
//!
//! Run from the repository root:
//!   cargo run --release --manifest-path shaders/rust-gpu-compiler/Cargo.toml

use std::{error::Error, path::Path};

/// Where the runner loads the kernels from by default.
const OUTPUT: &str = "assets/shaders/pbf_physics.spv";

fn main() -> Result<(), Box<dyn Error>> {
    let module = rust_gpu_compiler::build(Path::new("shaders/physics"))?;

    let output = Path::new(OUTPUT);
    if let Some(directory) = output.parent() {
        std::fs::create_dir_all(directory)?;
    }
    std::fs::copy(&module, output)?;
    println!("Wrote {}", output.display());
    Ok(())
}
