//! Loader - Genome and configuration files
//!
//! # Genome files (`.org`)
//!
//! One instruction name per line, `#` starts a comment:
//!
//! ```text
//! # self-copy loop
//! Mem-Set
//! Nop-A
//! Head-Move
//! ...
//! ```
//!
//! A file holding a single word that is not an instruction name is read as
//! a symbol string instead (`uaGcJyzwGa`, one symbol per instruction).
//!
//! # Configuration files
//!
//! JSON documents deserialized into [`HardwareConfig`] (validated after
//! loading) and [`InstSetConfig`]. Missing fields take their defaults.

use crate::config::{HardwareConfig, InstSetConfig};
use crate::error::{EvoError, Result};
use crate::vm::{Genome, InstLib};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Parse genome text against `lib`
pub fn parse_genome(text: &str, lib: &InstLib) -> Result<Genome> {
    let words: Vec<&str> = text
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter_map(|line| line.split_whitespace().next())
        .collect();

    if words.is_empty() {
        return Err(EvoError::EmptyGenome);
    }
    if let [word] = words.as_slice() {
        if lib.inst_for_name(word).is_err() {
            return Genome::from_symbols(word, lib.size());
        }
    }

    let insts = words
        .iter()
        .map(|word| lib.inst_for_name(word))
        .collect::<Result<Vec<_>>>()?;
    Ok(Genome::new(insts))
}

/// Load a genome file
pub fn load_genome(path: impl AsRef<Path>, lib: &InstLib) -> Result<Genome> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let genome = parse_genome(&text, lib)?;
    log::debug!("loaded {} instructions from {}", genome.len(), path.display());
    Ok(genome)
}

/// Write a genome one instruction name per line
pub fn save_genome(path: impl AsRef<Path>, genome: &Genome, lib: &InstLib) -> Result<()> {
    let mut file = fs::File::create(path)?;
    for &inst in genome.iter() {
        writeln!(file, "{}", lib.name(inst))?;
    }
    Ok(())
}

/// Load and validate a hardware configuration
pub fn load_config(path: impl AsRef<Path>) -> Result<HardwareConfig> {
    let text = fs::read_to_string(path)?;
    let config: HardwareConfig = serde_json::from_str(&text)?;
    config.validate()
}

/// Load instruction-set overrides
pub fn load_inst_set(path: impl AsRef<Path>) -> Result<InstSetConfig> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
