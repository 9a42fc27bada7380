//! Error types for evovm

use thiserror::Error;

/// Evovm error type
///
/// Only construction-time and loading paths are fallible. Instruction
/// handlers report faults through the organism instead.
#[derive(Debug, Error)]
pub enum EvoError {
    /// Instruction name not present in the instruction library
    #[error("Unknown instruction: {0}")]
    UnknownInstruction(String),

    /// Genome symbol outside the instruction library range
    #[error("Invalid instruction symbol '{symbol}' at offset {offset}")]
    InvalidSymbol { symbol: char, offset: usize },

    /// Genome with no instructions
    #[error("Genome is empty")]
    EmptyGenome,

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EvoError>;
