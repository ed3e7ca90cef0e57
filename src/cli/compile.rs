//! Compile command implementation.

use super::CliError;
use rampart::gateway::compile_script;
use rampart::isa::decode;
use rampart::vm::{DEFAULT_MEMORY_SIZE, Program, TEXT_BASE};
use std::fs;
use std::path::Path;

/// Execute the compile command.
///
/// # Errors
///
/// Returns an error if the source cannot be read or compiled, or the image
/// is over `size_limit`.
pub(crate) fn execute(source: &Path, size_limit: usize, output: Option<&Path>) -> Result<(), CliError> {
    let text = fs::read_to_string(source)
        .map_err(|e| CliError::new(format!("Failed to read {}: {e}", source.display())))?;

    println!("Compiling: {}", source.display());
    println!();

    let image = compile_script(&text).map_err(|e| CliError::new(format!("Compile error: {e}")))?;
    Program::from_bytes(&image, DEFAULT_MEMORY_SIZE)
        .map_err(|e| CliError::new(format!("Compiled image does not load: {e}")))?;

    let mut addr = TEXT_BASE;
    for chunk in image.chunks_exact(4) {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        match decode(word) {
            Ok(inst) => println!("  {addr:08x}:  {word:08x}  {inst}"),
            Err(_) => println!("  {addr:08x}:  {word:08x}  <invalid>"),
        }
        addr = addr.wrapping_add(4);
    }

    println!();
    println!("Size:  {} bytes (limit {size_limit})", image.len());
    if image.len() > size_limit {
        return Err(CliError::new(format!(
            "Image is {} bytes, over the {size_limit} byte limit",
            image.len()
        )));
    }

    if let Some(path) = output {
        fs::write(path, &image)?;
        println!("Written to: {}", path.display());
    }
    Ok(())
}
