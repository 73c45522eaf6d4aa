//! Keygen command implementation

use std::path::Path;

use anyhow::{Context, Result};

use mshell_core::identity::{read_public_key, write_keypair};

use crate::output::print_success;

/// Generate `<name>.key` and `<name>.pub` in `dir`
pub fn keygen_command(name: &str, dir: &Path) -> Result<()> {
    if name.is_empty() || name.contains(std::path::is_separator) {
        anyhow::bail!("Invalid key name {:?}", name);
    }

    let (private_path, public_path) = write_keypair(dir, name)
        .with_context(|| format!("Failed to write keypair {:?} in {:?}", name, dir))?;
    let public = read_public_key(&public_path)?;

    print_success(&format!(
        "Wrote {} and {} (fingerprint {})",
        private_path.display(),
        public_path.display(),
        public.fingerprint()
    ));
    Ok(())
}
